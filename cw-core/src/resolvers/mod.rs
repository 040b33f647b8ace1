pub mod location;
pub mod names;
pub mod types;

pub use location::*;
pub use names::*;
pub use types::*;
