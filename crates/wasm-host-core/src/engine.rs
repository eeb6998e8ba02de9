//! Shared validation environment.
//!
//! The [`Engine`] is the foundation of the host. It is:
//! - Built once from a [`Config`] and immutable afterwards
//! - Atomically reference counted, so handles are cheap to clone and may be
//!   released from any thread
//! - Shared by every store created from it, but holds no per-store state

use std::sync::{Arc, Weak};

use tracing::{debug, info};
use wasmparser::WasmFeatures;

use wasm_host_common::{Config, RuntimeError};

use crate::module::ModuleSummary;

/// Thread-safe handle to a shared validation environment.
///
/// Cloning an `Engine` yields a new handle to the *same* environment; the
/// environment is torn down when the last handle is dropped.
///
/// # Example
///
/// ```ignore
/// use wasm_host_common::Config;
/// use wasm_host_core::Engine;
///
/// let mut config = Config::default();
/// config.consume_fuel(true);
/// let engine = Engine::new(&config);
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// A weak reference to an [`Engine`].
///
/// Does not keep the environment alive.
#[derive(Clone)]
pub struct EngineWeak {
    inner: Weak<EngineInner>,
}

impl EngineWeak {
    /// Upgrades to an [`Engine`].
    ///
    /// Returns `None` if every [`Engine`] handle has been released.
    pub fn upgrade(&self) -> Option<Engine> {
        let inner = self.inner.upgrade()?;
        Some(Engine { inner })
    }
}

impl std::fmt::Debug for EngineWeak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineWeak")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// The environment shared by all handles of one [`Engine`].
struct EngineInner {
    config: Config,
    features: WasmFeatures,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        debug!("Engine released");
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Engine {
    /// Create a new engine from the given configuration.
    ///
    /// The configuration is copied, so later changes to `config` do not
    /// affect the returned engine. Every combination of toggles is accepted
    /// here; incompatibilities surface when modules are validated.
    pub fn new(config: &Config) -> Self {
        let features = Self::features_from_config(config);

        info!(
            consume_fuel = config.get_consume_fuel(),
            compilation_mode = ?config.get_compilation_mode(),
            "Engine initialized"
        );

        Self {
            inner: Arc::new(EngineInner {
                config: config.clone(),
                features,
            }),
        }
    }

    /// Translate the proposal toggles into the validator's feature set.
    fn features_from_config(config: &Config) -> WasmFeatures {
        let mut features = WasmFeatures::empty();
        features.set(WasmFeatures::MUTABLE_GLOBAL, config.get_mutable_global());
        features.set(WasmFeatures::MULTI_VALUE, config.get_multi_value());
        features.set(WasmFeatures::SIGN_EXTENSION, config.get_sign_extension());
        features.set(
            WasmFeatures::SATURATING_FLOAT_TO_INT,
            config.get_saturating_float_to_int(),
        );
        features.set(WasmFeatures::BULK_MEMORY, config.get_bulk_memory());
        features.set(WasmFeatures::REFERENCE_TYPES, config.get_reference_types());
        // reference-types relies on the GC type hierarchy in the validator
        features.set(WasmFeatures::GC_TYPES, config.get_reference_types());
        features.set(WasmFeatures::TAIL_CALL, config.get_tail_call());
        features.set(WasmFeatures::EXTENDED_CONST, config.get_extended_const());
        features.set(WasmFeatures::FLOATS, config.get_floats());
        features.set(WasmFeatures::MULTI_MEMORY, config.get_multi_memory());
        features.set(WasmFeatures::MEMORY64, config.get_memory64());
        features.set(WasmFeatures::CUSTOM_PAGE_SIZES, config.get_custom_page_sizes());
        features
    }

    /// Creates an [`EngineWeak`] to this engine's environment.
    pub fn weak(&self) -> EngineWeak {
        EngineWeak {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles share the same environment.
    pub fn same(a: &Engine, b: &Engine) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Get the frozen engine configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the Wasm features modules are validated against.
    pub fn features(&self) -> WasmFeatures {
        self.inner.features
    }

    /// Validate a module binary against this engine's feature gates.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Validation`] if the module is malformed or
    /// uses a disabled proposal.
    pub fn validate(&self, wasm: &[u8]) -> Result<ModuleSummary, RuntimeError> {
        ModuleSummary::validate(self, wasm)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("consume_fuel", &self.config().get_consume_fuel())
            .field("compilation_mode", &self.config().get_compilation_mode())
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}
