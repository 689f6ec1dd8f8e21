//! Common validation rules shared across request payloads.

use chrono::{DateTime, Duration, Utc};
use tableside_client::constants::SESSION_DURATION_SECS;
use tableside_client::token::is_valid_token;
use validator::ValidationError;

/// Clock skew tolerated between a device and the store when checking a
/// requested expiry against the fixed session lifetime.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Validates session token format.
///
/// Requirements:
/// - `{device_ip}-{millis}-{uuid_v4}` shape, parsed from the right
pub fn validate_session_token(token: &str) -> Result<(), ValidationError> {
    if !is_valid_token(token) {
        return Err(ValidationError::new("session_token_invalid_format"));
    }
    Ok(())
}

/// Validates table number format.
///
/// Requirements:
/// - Only alphanumeric characters and dashes
/// - 1-16 characters in length
pub fn validate_table_number(table_number: &str) -> Result<(), ValidationError> {
    if table_number.is_empty() || table_number.len() > 16 {
        return Err(ValidationError::new("table_number_invalid_length"));
    }

    if !table_number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ValidationError::new("table_number_invalid_characters"));
    }

    Ok(())
}

/// Validates a requested session expiry.
///
/// Requirements:
/// - In the future
/// - No further out than the fixed session lifetime, plus skew tolerance
pub fn validate_expires_at(expires_at: &DateTime<Utc>) -> Result<(), ValidationError> {
    let now = Utc::now();
    if *expires_at <= now {
        return Err(ValidationError::new("expires_at_in_past"));
    }
    if *expires_at > now + Duration::seconds(SESSION_DURATION_SECS + EXPIRY_SKEW_SECS) {
        return Err(ValidationError::new("expires_at_too_far"));
    }
    Ok(())
}
