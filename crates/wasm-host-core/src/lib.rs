//! Embedding host core for WebAssembly.
//!
//! This crate provides the state model code runs against:
//! - [`Engine`]: Immutable, shared validation environment
//! - [`Store`]: Per-session owner of objects, embedder data and fuel
//! - [`StoreContext`] / [`StoreContextMut`]: Borrowed views into a store
//! - [`Fuel`]: Per-store meter that turns exhaustion into a trap
//! - [`Executor`]: The boundary where code is run against a store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Engine                           │
//! │  (Shared across stores and threads, Arc refcounted)     │
//! │  - Frozen Config                                        │
//! │  - Wasm feature gates                                   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                         Store                           │
//! │  (One per session, Send + !Sync)                        │
//! │  - Handle table                                         │
//! │  - Embedder data + finalizer                            │
//! │  - Fuel meter                                           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │             StoreContextMut  →  Executor                │
//! │  (Borrowed for one call)                                │
//! │  - Consumes fuel per unit of work                       │
//! │  - Traps when the meter runs dry                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod engine;
pub mod executor;
pub mod fuel;
pub mod handle;
pub mod module;
pub mod store;

pub use context::{AsContext, AsContextMut, StoreContext, StoreContextMut};
pub use engine::{Engine, EngineWeak};
pub use executor::{CallHook, Executor, execute};
pub use fuel::{Fuel, FuelError, FuelState};
pub use handle::{Handle, StoreId};
pub use module::{CustomSection, ModuleSummary};
pub use store::{EmbedderData, Finalizer, Store};

/// A semantic version triple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version of this crate as a string.
pub const VERSION_STR: &str = env!("CARGO_PKG_VERSION");

/// Version of this crate.
pub const VERSION: Version = Version {
    major: parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_component(env!("CARGO_PKG_VERSION_MINOR")),
    patch: parse_component(env!("CARGO_PKG_VERSION_PATCH")),
};

const fn parse_component(digits: &str) -> u32 {
    match u32::from_str_radix(digits, 10) {
        Ok(value) => value,
        Err(_) => panic!("version component is not a number"),
    }
}
