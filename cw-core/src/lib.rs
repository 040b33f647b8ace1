pub mod configuration;
pub mod esi_client;
pub mod expansion;
pub mod in_memory_esi;
pub mod outbid;
pub mod pagination;
pub mod reqwest_helpers;
pub mod resolvers;
pub mod sync;

#[cfg(test)]
pub mod test_objects;
