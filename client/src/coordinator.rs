//! The per-table session coordinator.
//!
//! One coordinator instance represents one device's claim on one
//! `(restaurant, table)` scope. It drives the role state machine
//!
//! ```text
//! Uninitialized -> Resolving -> Main | Guest -> Ended
//! ```
//!
//! and publishes every state change over a `tokio::sync::watch` channel so
//! UIs and the feed task can react to transitions. All operations serialize
//! on an internal async mutex; the store itself enforces the single-main
//! invariant, the coordinator only ever proposes changes.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use validator::Validate;

use crate::cache::{CachedSession, SessionCache};
use crate::cart::CartSnapshot;
use crate::error::{CoordinatorError, StoreError};
use crate::events::SessionEvent;
use crate::identity::IdentityProvider;
use crate::session::DeviceSession;
use crate::session::NewDeviceSession;
use crate::store::SessionStore;
use crate::token::mint_session_token;
use crate::types::RestaurantId;

/// The role a device holds at its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Owns the cart and may submit the order.
    Main,
    /// Observes the shared cart; may request a takeover.
    Guest,
}

/// Lifecycle phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    /// Identity lookup and election in progress.
    Resolving,
    Main,
    Guest,
    /// The session is over; the coordinator cannot be reused.
    Ended,
}

/// Observable coordinator snapshot, published on every transition.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    pub phase: SessionPhase,
    /// This device's own session row.
    pub session: Option<DeviceSession>,
    /// The scope's current main row (equal to `session` when we are Main).
    pub main_session: Option<DeviceSession>,
    /// Resolved device identity.
    pub device_ip: Option<String>,
}

impl CoordinatorState {
    pub fn role(&self) -> Option<DeviceRole> {
        match self.phase {
            SessionPhase::Main => Some(DeviceRole::Main),
            SessionPhase::Guest => Some(DeviceRole::Guest),
            _ => None,
        }
    }

    /// Whole seconds until this device's session expires; 0 without one.
    pub fn time_left_secs(&self) -> i64 {
        self.session
            .as_ref()
            .map(DeviceSession::time_left_secs)
            .unwrap_or(0)
    }

    /// The table's shared cart, decoded from the main row. A malformed
    /// blob is discarded rather than surfaced.
    pub fn cart(&self) -> CartSnapshot {
        let Some(main) = &self.main_session else {
            return CartSnapshot::empty();
        };
        match CartSnapshot::from_value(&main.order_data) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed cart snapshot from store");
                CartSnapshot::empty()
            }
        }
    }
}

struct Inner {
    phase: SessionPhase,
    session: Option<DeviceSession>,
    main_session: Option<DeviceSession>,
    device_ip: Option<String>,
}

/// Coordinates this device's session for one table.
pub struct SessionCoordinator {
    store: Arc<dyn SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    restaurant_id: RestaurantId,
    table_number: String,
    cache: Option<SessionCache>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CoordinatorState>,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        restaurant_id: RestaurantId,
        table_number: impl Into<String>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        Self {
            store,
            identity,
            restaurant_id,
            table_number: table_number.into(),
            cache: None,
            inner: Mutex::new(Inner {
                phase: SessionPhase::Uninitialized,
                session: None,
                main_session: None,
                device_ip: None,
            }),
            state_tx,
        }
    }

    /// Attaches a crash-recovery cache; see [`SessionCoordinator::resume`].
    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.restaurant_id
    }

    pub fn table_number(&self) -> &str {
        &self.table_number
    }

    /// Current snapshot of the coordinator state.
    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Watch channel for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Seconds until this device's session expires, clamped at zero.
    pub fn time_left_secs(&self) -> i64 {
        self.state_tx.borrow().time_left_secs()
    }

    /// Resolves identity, elects a role, and claims a session row.
    ///
    /// Idempotent: calling again while Main or Guest returns the current
    /// role without touching the store. A store outage aborts the election
    /// with no role claimed; it is safe to call again once the store is
    /// back.
    pub async fn initialize(&self) -> Result<DeviceRole, CoordinatorError> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            SessionPhase::Main => return Ok(DeviceRole::Main),
            SessionPhase::Guest => return Ok(DeviceRole::Guest),
            SessionPhase::Ended => return Err(CoordinatorError::Ended),
            SessionPhase::Uninitialized | SessionPhase::Resolving => {}
        }
        inner.phase = SessionPhase::Resolving;
        self.publish(&inner);

        let device_ip = match inner.device_ip.clone() {
            Some(ip) => ip,
            None => {
                let ip = self.identity.resolve().await;
                inner.device_ip = Some(ip.clone());
                ip
            }
        };

        if let Err(err) = self
            .store
            .cleanup_expired(self.restaurant_id, &self.table_number)
            .await
        {
            tracing::debug!(error = %err, "expired session cleanup failed, continuing");
        }

        let sessions = match self
            .store
            .list_active(self.restaurant_id, &self.table_number)
            .await
        {
            Ok(sessions) => sessions,
            Err(err) => return Err(self.fail_election(&mut inner, err)),
        };

        let session = match active_main(&sessions) {
            None => {
                match self.store.insert(self.own_claim(&device_ip, true)).await {
                    Ok(session) => session,
                    Err(StoreError::Conflict(_)) => {
                        // Lost the election race; join the winner as a guest.
                        let relisted = match self
                            .store
                            .list_active(self.restaurant_id, &self.table_number)
                            .await
                        {
                            Ok(sessions) => sessions,
                            Err(err) => return Err(self.fail_election(&mut inner, err)),
                        };
                        inner.main_session = active_main(&relisted).cloned();
                        match self.store.insert(self.own_claim(&device_ip, false)).await {
                            Ok(session) => session,
                            Err(err) => return Err(self.fail_election(&mut inner, err)),
                        }
                    }
                    Err(err) => return Err(self.fail_election(&mut inner, err)),
                }
            }
            Some(main) => {
                inner.main_session = Some(main.clone());
                match self.store.insert(self.own_claim(&device_ip, false)).await {
                    Ok(session) => session,
                    Err(err) => return Err(self.fail_election(&mut inner, err)),
                }
            }
        };

        let role = if session.is_main_device {
            inner.phase = SessionPhase::Main;
            inner.main_session = Some(session.clone());
            DeviceRole::Main
        } else {
            inner.phase = SessionPhase::Guest;
            DeviceRole::Guest
        };
        inner.session = Some(session);
        self.publish(&inner);
        self.write_cache(&inner);
        Ok(role)
    }

    /// Tries to re-adopt the session claim left by a previous run.
    ///
    /// Returns `Ok(None)` when there is nothing usable to resume (no cache
    /// attached, no file, wrong scope, or the row is gone); the caller then
    /// proceeds with [`SessionCoordinator::initialize`]. A store outage is
    /// surfaced without discarding the cached claim.
    pub async fn resume(&self) -> Result<Option<DeviceRole>, CoordinatorError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let mut inner = self.inner.lock().await;
        match inner.phase {
            SessionPhase::Uninitialized => {}
            _ => return Ok(self.state_tx.borrow().role()),
        }
        let Some(cached) = cache.load() else {
            return Ok(None);
        };
        if cached.restaurant_id != self.restaurant_id || cached.table_number != self.table_number {
            return Ok(None);
        }

        match self.store.find_by_token(&cached.session_token).await {
            Ok(Some(row)) => {
                inner.device_ip = Some(row.device_ip.clone());
                let role = if row.is_main_device {
                    inner.phase = SessionPhase::Main;
                    inner.main_session = Some(row.clone());
                    DeviceRole::Main
                } else {
                    inner.phase = SessionPhase::Guest;
                    DeviceRole::Guest
                };
                inner.session = Some(row);
                if role == DeviceRole::Guest {
                    if let Ok(sessions) = self
                        .store
                        .list_active(self.restaurant_id, &self.table_number)
                        .await
                    {
                        inner.main_session = active_main(&sessions).cloned();
                    }
                }
                self.publish(&inner);
                Ok(Some(role))
            }
            Ok(None) => {
                cache.clear();
                Ok(None)
            }
            Err(err) if err.is_retryable() => Err(err.into()),
            Err(err) => {
                tracing::warn!(error = %err, "cached session claim rejected, discarding");
                cache.clear();
                Ok(None)
            }
        }
    }

    /// Takes the main role over from the current main device.
    ///
    /// On a clean transfer the roles swap atomically and the cart carries
    /// over. When the main vanished mid-takeover the coordinator promotes
    /// its own row instead; if somebody else already holds the role the
    /// takeover fails with [`CoordinatorError::MainHeldElsewhere`] and this
    /// device stays a Guest. A store outage aborts with the role unchanged.
    pub async fn takeover(&self) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != SessionPhase::Guest {
            return Err(CoordinatorError::NotGuest);
        }
        let Some(own) = inner.session.clone() else {
            return Err(CoordinatorError::NoSession);
        };

        let known_main = inner
            .main_session
            .clone()
            .filter(|main| main.session_token != own.session_token && !main.is_expired());
        let current_main = match known_main {
            Some(main) => Some(main),
            None => {
                let sessions = self
                    .store
                    .list_active(self.restaurant_id, &self.table_number)
                    .await?;
                active_main(&sessions)
                    .filter(|main| main.session_token != own.session_token)
                    .cloned()
            }
        };

        let Some(main) = current_main else {
            // No live main to take from; claim the role directly.
            return self.promote_self(&mut inner, &own).await;
        };

        if self
            .store
            .transfer_main(&main.session_token, &own.session_token)
            .await?
        {
            let refreshed = match self.store.find_by_token(&own.session_token).await {
                Ok(Some(row)) => row,
                _ => {
                    // The transfer itself succeeded; reconstruct the row
                    // locally until the next reconcile refreshes it.
                    let mut promoted = own.clone();
                    promoted.is_main_device = true;
                    promoted.order_data = main.order_data.clone();
                    promoted.last_activity = Utc::now();
                    promoted
                }
            };
            self.adopt_main(&mut inner, refreshed);
            return Ok(());
        }

        // The transfer moved nothing: the main either vanished or was
        // replaced. Re-list to find out which.
        let sessions = self
            .store
            .list_active(self.restaurant_id, &self.table_number)
            .await?;
        match active_main(&sessions) {
            None => self.promote_self(&mut inner, &own).await,
            Some(rival) if rival.session_token == own.session_token => {
                let row = rival.clone();
                self.adopt_main(&mut inner, row);
                Ok(())
            }
            Some(rival) => {
                inner.main_session = Some(rival.clone());
                self.publish(&inner);
                Err(CoordinatorError::MainHeldElsewhere)
            }
        }
    }

    /// Publishes a new cart snapshot. Main only; the snapshot is validated
    /// before anything is sent.
    pub async fn update_order_data(
        &self,
        snapshot: &CartSnapshot,
    ) -> Result<DeviceSession, CoordinatorError> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            SessionPhase::Main => {}
            SessionPhase::Ended => return Err(CoordinatorError::Ended),
            _ => return Err(CoordinatorError::NotMain),
        }
        let Some(own) = inner.session.clone() else {
            return Err(CoordinatorError::NoSession);
        };
        snapshot
            .validate()
            .map_err(|err| CoordinatorError::InvalidCart(err.to_string()))?;

        let mut stamped = snapshot.clone();
        stamped.updated_at = Some(Utc::now());
        let updated = self
            .store
            .update_order_data(&own.session_token, &stamped)
            .await?;
        inner.session = Some(updated.clone());
        inner.main_session = Some(updated.clone());
        self.publish(&inner);
        Ok(updated)
    }

    /// Bumps `last_activity` on the own row.
    pub async fn touch(&self) -> Result<(), CoordinatorError> {
        let inner = self.inner.lock().await;
        let Some(own) = &inner.session else {
            return Err(CoordinatorError::NoSession);
        };
        self.store.touch(&own.session_token).await?;
        Ok(())
    }

    /// Ends the session. The local state moves to `Ended` regardless of
    /// whether the store delete succeeds; a failure is logged, not
    /// surfaced.
    pub async fn end_session(&self) {
        let mut inner = self.inner.lock().await;
        if inner.phase == SessionPhase::Ended {
            return;
        }
        if let Some(own) = inner.session.clone() {
            if let Err(err) = self.store.delete(&own.session_token).await {
                tracing::warn!(error = %err, "failed to delete session row, ending locally anyway");
            }
        }
        self.finish(&mut inner);
    }

    /// Applies a change-feed event to the local view. Events for other
    /// scopes and events arriving before initialization are ignored.
    pub async fn apply_event(&self, event: &SessionEvent) {
        if !event.matches_scope(&self.restaurant_id, &self.table_number) {
            return;
        }
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, SessionPhase::Main | SessionPhase::Guest) {
            return;
        }

        match event {
            SessionEvent::Created { session } | SessionEvent::Updated { session } => {
                self.ingest_row(&mut inner, session);
            }
            SessionEvent::Transferred { old_token, session } => {
                let own_token = inner
                    .session
                    .as_ref()
                    .map(|own| own.session_token.clone());
                if own_token.as_deref() == Some(session.session_token.as_str()) {
                    let row = session.clone();
                    self.adopt_main(&mut inner, row);
                    return;
                }
                if own_token.as_deref() == Some(old_token.as_str()) {
                    if let Some(own) = inner.session.as_mut() {
                        own.is_main_device = false;
                    }
                    inner.phase = SessionPhase::Guest;
                    tracing::info!("main role was transferred away from this device");
                }
                inner.main_session = Some(session.clone());
                self.publish(&inner);
            }
            SessionEvent::Deleted { session_token, .. } => {
                let own_token = inner
                    .session
                    .as_ref()
                    .map(|own| own.session_token.clone());
                if own_token.as_deref() == Some(session_token.as_str()) {
                    tracing::info!("own session row was removed from the store");
                    self.finish(&mut inner);
                    return;
                }
                if inner
                    .main_session
                    .as_ref()
                    .is_some_and(|main| main.session_token == *session_token)
                {
                    inner.main_session = None;
                    self.publish(&inner);
                }
            }
        }
    }

    /// Re-lists the scope and reconciles the local view, last-writer-wins
    /// by `last_activity`. A store failure leaves the state untouched; an
    /// authoritative list that no longer contains the own row ends the
    /// session.
    pub async fn reconcile(&self) {
        let sessions = match self
            .store
            .list_active(self.restaurant_id, &self.table_number)
            .await
        {
            Ok(sessions) => sessions,
            Err(err) => {
                tracing::debug!(error = %err, "reconcile skipped, store unavailable");
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, SessionPhase::Main | SessionPhase::Guest) {
            return;
        }
        let Some(own) = inner.session.clone() else {
            return;
        };

        match sessions
            .iter()
            .find(|row| row.session_token == own.session_token)
        {
            None => {
                tracing::info!("own session no longer active, ending");
                self.finish(&mut inner);
                return;
            }
            Some(row) => {
                if row.last_activity >= own.last_activity
                    || row.is_main_device != own.is_main_device
                {
                    inner.phase = if row.is_main_device {
                        SessionPhase::Main
                    } else {
                        SessionPhase::Guest
                    };
                    inner.session = Some(row.clone());
                }
            }
        }

        let listed_main = active_main(&sessions).cloned();
        inner.main_session = match (listed_main, inner.main_session.take()) {
            (Some(listed), Some(current))
                if listed.session_token == current.session_token
                    && current.last_activity > listed.last_activity =>
            {
                // A feed event between our list and this lock delivered a
                // fresher copy; keep it.
                Some(current)
            }
            (Some(listed), _) => Some(listed),
            (None, _) => None,
        };
        self.publish(&inner);
    }

    /// Moves to `Ended` if the own session has passed its expiry.
    pub async fn check_expiry(&self) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, SessionPhase::Main | SessionPhase::Guest) {
            return;
        }
        if inner
            .session
            .as_ref()
            .is_some_and(DeviceSession::is_expired)
        {
            tracing::info!("session reached its hard expiry");
            self.finish(&mut inner);
        }
    }

    fn own_claim(&self, device_ip: &str, is_main: bool) -> NewDeviceSession {
        NewDeviceSession::starting_now(
            mint_session_token(device_ip),
            device_ip.to_string(),
            self.restaurant_id,
            self.table_number.clone(),
            is_main,
        )
    }

    fn fail_election(&self, inner: &mut Inner, err: StoreError) -> CoordinatorError {
        inner.phase = SessionPhase::Uninitialized;
        self.publish(inner);
        err.into()
    }

    async fn promote_self(
        &self,
        inner: &mut Inner,
        own: &DeviceSession,
    ) -> Result<(), CoordinatorError> {
        match self.store.promote(&own.session_token).await {
            Ok(promoted) => {
                self.adopt_main(inner, promoted);
                Ok(())
            }
            Err(StoreError::Conflict(_)) => {
                if let Ok(sessions) = self
                    .store
                    .list_active(self.restaurant_id, &self.table_number)
                    .await
                {
                    inner.main_session = active_main(&sessions).cloned();
                    self.publish(inner);
                }
                Err(CoordinatorError::MainHeldElsewhere)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn adopt_main(&self, inner: &mut Inner, row: DeviceSession) {
        inner.phase = SessionPhase::Main;
        inner.main_session = Some(row.clone());
        inner.session = Some(row);
        self.publish(inner);
    }

    fn ingest_row(&self, inner: &mut Inner, row: &DeviceSession) {
        let mut changed = false;

        if let Some(own) = inner.session.clone() {
            if own.session_token == row.session_token && row.last_activity >= own.last_activity {
                inner.phase = if row.is_main_device {
                    SessionPhase::Main
                } else {
                    SessionPhase::Guest
                };
                inner.session = Some(row.clone());
                changed = true;
            }
        }

        if row.is_main_device && !row.is_expired() {
            let replace = match &inner.main_session {
                Some(current) if current.session_token == row.session_token => {
                    row.last_activity >= current.last_activity
                }
                _ => true,
            };
            if replace {
                inner.main_session = Some(row.clone());
                changed = true;
            }
        } else if inner
            .main_session
            .as_ref()
            .is_some_and(|main| main.session_token == row.session_token)
        {
            // The row we believed to be main no longer is.
            inner.main_session = None;
            changed = true;
        }

        if changed {
            self.publish(&*inner);
        }
    }

    fn finish(&self, inner: &mut Inner) {
        inner.phase = SessionPhase::Ended;
        inner.session = None;
        inner.main_session = None;
        self.publish(inner);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn write_cache(&self, inner: &Inner) {
        let (Some(cache), Some(own)) = (&self.cache, &inner.session) else {
            return;
        };
        let entry = CachedSession {
            session_token: own.session_token.clone(),
            restaurant_id: self.restaurant_id,
            table_number: self.table_number.clone(),
        };
        if let Err(err) = cache.save(&entry) {
            tracing::debug!(error = %err, "failed to write session cache");
        }
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(CoordinatorState {
            phase: inner.phase,
            session: inner.session.clone(),
            main_session: inner.main_session.clone(),
            device_ip: inner.device_ip.clone(),
        });
    }
}

/// Picks the authoritative main from a listing. A listing holding more than
/// one main has a breached store invariant; the earliest `created_at` wins
/// and the anomaly is logged.
fn active_main(sessions: &[DeviceSession]) -> Option<&DeviceSession> {
    let mains: Vec<&DeviceSession> = sessions
        .iter()
        .filter(|session| session.is_main_device && !session.is_expired())
        .collect();
    if mains.len() > 1 {
        tracing::warn!(
            count = mains.len(),
            "store listed multiple main devices for one table, keeping the earliest"
        );
    }
    mains.into_iter().min_by_key(|session| session.created_at)
}
