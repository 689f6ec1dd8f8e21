pub mod rate_limit;
pub mod request_id;
pub mod session_token;

pub use rate_limit::*;
pub use request_id::*;
pub use session_token::*;
