pub mod feature;
pub mod selection;
pub mod sync;

pub use feature::*;
pub use selection::*;
pub use sync::*;
