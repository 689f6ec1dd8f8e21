//! Crash-recovery cache for the device's own session claim.
//!
//! After a successful initialize the coordinator writes
//! `{session_token, restaurant_id, table_number}` to a JSON file so a
//! restarted process can try to re-adopt its row. The cache is never a
//! source of truth: resume always re-checks the store, and a corrupt or
//! stale file is silently discarded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::RestaurantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub session_token: String,
    pub restaurant_id: RestaurantId,
    pub table_number: String,
}

/// File-backed cache of the last session claim.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached claim. Missing, unreadable, or malformed files all
    /// yield `None`; malformed files are removed so they cannot keep
    /// failing.
    pub fn load(&self) -> Option<CachedSession> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read session cache");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "discarding corrupt session cache"
                );
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, cached: &CachedSession) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(cached).map_err(io::Error::other)?;
        fs::write(&self.path, raw)
    }

    /// Best-effort removal of the cache file.
    pub fn clear(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %self.path.display(), error = %err, "failed to remove session cache");
            }
        }
    }
}
