use thiserror::Error;

/// Failure classes reported by a session store.
///
/// The distinction matters for election safety: `Unavailable` means the
/// store could not answer, which is never the same as "no sessions exist".
/// A coordinator must not claim a role on the back of an `Unavailable`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or answered with a server-side fault.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A write collided with the single-main invariant or a concurrent
    /// transfer.
    #[error("session store conflict: {0}")]
    Conflict(String),

    /// The session token was missing, malformed, or rejected.
    #[error("session store rejected the session token: {0}")]
    Unauthorized(String),

    /// The referenced session row does not exist (or has expired).
    #[error("session not found: {0}")]
    NotFound(String),

    /// A row or payload could not be decoded into the expected shape.
    #[error("malformed store data: {0}")]
    Malformed(String),
}

impl StoreError {
    /// True when retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors surfaced by [`crate::coordinator::SessionCoordinator`] operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The operation requires the Main role.
    #[error("this device is not the main device")]
    NotMain,

    /// Takeover is only meaningful for a Guest with a live session.
    #[error("takeover requires an active guest session")]
    NotGuest,

    /// No live session is attached to this coordinator.
    #[error("no active session")]
    NoSession,

    /// The coordinator has already ended its session.
    #[error("session has ended")]
    Ended,

    /// A different device won or kept the main role during a takeover.
    #[error("another device holds the main role")]
    MainHeldElsewhere,

    /// The cart snapshot failed validation and was not sent.
    #[error("invalid cart snapshot: {0}")]
    InvalidCart(String),
}
