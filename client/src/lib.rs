//! Device-side library for table session coordination.
//!
//! A device scanning a table's QR code uses this crate to claim a session
//! row in the shared store, elect the table's single main device, follow
//! the shared cart, and hand the main role over between devices. The
//! [`coordinator::SessionCoordinator`] is the entry point; everything else
//! supports it.

pub mod cache;
pub mod cart;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod feed;
pub mod identity;
pub mod session;
pub mod store;
pub mod token;
pub mod types;

pub use cart::{CartLine, CartSnapshot};
pub use coordinator::{CoordinatorState, DeviceRole, SessionCoordinator, SessionPhase};
pub use error::{CoordinatorError, StoreError};
pub use events::SessionEvent;
pub use session::{DeviceSession, NewDeviceSession};
pub use store::http::{HttpSessionStore, SESSION_TOKEN_HEADER};
pub use store::SessionStore;
pub use types::{RestaurantId, SessionId};
