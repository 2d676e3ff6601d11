//! Layered application configuration.
//!
//! Precedence, highest first: CLI flag > environment variable > TOML file
//! value > built-in default. The file is read once at startup; [`ConfigStore`]
//! then serves it from a lock-free `ArcSwap` cache for the lifetime of the
//! process.

pub mod schema;
pub mod store;

pub use schema::AppConfig;
pub use store::{ConfigChange, ConfigStore};
