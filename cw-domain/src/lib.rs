pub mod contract_model;
pub mod esi_model;
pub mod filters;
pub mod snapshot;

pub use contract_model::*;
pub use esi_model::*;
pub use filters::*;
pub use snapshot::*;
