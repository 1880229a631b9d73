pub mod cache;
pub mod pipeline;
pub mod request;
pub mod source;

pub use cache::*;
pub use pipeline::*;
pub use request::*;
pub use source::*;
