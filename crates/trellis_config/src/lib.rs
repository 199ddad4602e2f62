//! Parsing and validation of `trellis.toml` configuration files.
//!
//! This crate reads the type cache settings and the assembly inventory and
//! turns them into a strongly-typed [`ProjectConfig`] that can build the
//! [`InventoryTypeSystem`](trellis_typecache::InventoryTypeSystem) the cache
//! validates against.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use types::*;
