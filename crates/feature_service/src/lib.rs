//! Feature discovery against a WFS-style feature service.

pub mod encoder;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod response;
pub mod transport;

pub use encoder::*;
pub use error::*;
pub use fetcher::*;
pub use normalize::*;
pub use response::*;
pub use transport::*;
