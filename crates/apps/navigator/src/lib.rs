pub mod config;
pub mod log_sync;
pub mod session;

pub use config::*;
pub use log_sync::*;
pub use session::*;
