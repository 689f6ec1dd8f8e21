pub mod feed;
pub mod health;
pub mod sessions;

pub use feed::*;
pub use health::*;
pub use sessions::*;
