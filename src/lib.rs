// Library for tests to access modules

pub mod adhoc;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod fleet;
pub mod inventory;
pub mod models;
pub mod platform;
pub mod probe;
pub mod snapshot;
pub mod stockpile;
pub mod transport;
pub mod version;
