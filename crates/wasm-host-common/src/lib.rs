//! Configuration values and error types for wasm-host.
//!
//! This crate provides shared functionality used across the wasm-host workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - The feature/fuel [`Config`] consumed by engine construction
//! - Per-store limits ([`StoreConfig`]) and TOML configuration files

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{CompilationMode, Config, FuelCosts, HostConfig, StoreConfig};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::{RuntimeError, Trap};
