pub mod cache_bmc;
pub mod contract_bmc;
pub mod file_store;

pub use cache_bmc::*;
pub use contract_bmc::*;
pub use file_store::*;
