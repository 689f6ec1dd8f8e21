//! Session token minting and shape validation.
//!
//! A token is `{device_ip}-{millis}-{uuid_v4}` joined with `-`. The backend
//! authorizes mutating calls by this shape plus a row lookup, so both sides
//! share the parsing rules. The device identity itself may contain `-`
//! (synthetic fallback identities do), so parsing works from the right: the
//! UUID is the fixed-width tail, the millis sit just before it.

use chrono::Utc;
use uuid::Uuid;

/// Canonical UUID text length, the fixed-width tail of every token.
const UUID_LEN: usize = 36;

/// Decomposed parts of a well-formed session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParts {
    pub device_ip: String,
    pub minted_at_millis: i64,
    pub nonce: Uuid,
}

/// Mints a fresh session token for the given device identity.
pub fn mint_session_token(device_ip: &str) -> String {
    format!(
        "{}-{}-{}",
        device_ip,
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

/// Parses a session token back into its parts. Returns `None` for anything
/// that does not match the `{device_ip}-{millis}-{uuid_v4}` shape.
pub fn parse_session_token(token: &str) -> Option<TokenParts> {
    if token.len() <= UUID_LEN + 1 {
        return None;
    }
    let (head, uuid_part) = token.split_at(token.len() - UUID_LEN);
    let nonce = Uuid::parse_str(uuid_part).ok()?;

    let head = head.strip_suffix('-')?;
    let (device_ip, millis_part) = head.rsplit_once('-')?;
    if device_ip.is_empty() {
        return None;
    }
    let minted_at_millis: i64 = millis_part.parse().ok()?;
    if minted_at_millis < 0 {
        return None;
    }

    Some(TokenParts {
        device_ip: device_ip.to_string(),
        minted_at_millis,
        nonce,
    })
}

/// Cheap shape check used before sending a token to the store.
pub fn is_valid_token(token: &str) -> bool {
    parse_session_token(token).is_some()
}
