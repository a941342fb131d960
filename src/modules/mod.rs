pub mod logger;
pub mod mapping_store;
pub mod request_log;
pub mod roster;
pub mod usage;
