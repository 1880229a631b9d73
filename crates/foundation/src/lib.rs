pub mod bounds;
pub mod srs;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use srs::*;
