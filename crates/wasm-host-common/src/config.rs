//! Configuration structures for wasm-host.
//!
//! This module defines configuration options for the components of the host:
//! - [`HostConfig`]: Top-level configuration containing all settings
//! - [`Config`]: Feature gates, fuel metering and compilation mode of an engine
//! - [`StoreConfig`]: Per-store limits (initial fuel, handle table size)
//! - [`FuelCosts`]: Prices executors charge for units of work

use std::mem;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Top-level host configuration.
///
/// This structure contains all configuration options for the host.
/// It can be loaded from TOML files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    /// Engine configuration.
    #[serde(default)]
    pub engine: Config,

    /// Per-store configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

/// The chosen mode of Wasm compilation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilationMode {
    /// Function bodies are validated and translated eagerly.
    #[default]
    Eager,
    /// Function bodies are validated eagerly and translated on first use.
    LazyTranslation,
    /// Function bodies are validated and translated on first use.
    ///
    /// # Note
    ///
    /// Validation errors inside function bodies surface at execution time,
    /// so this mode must not be used where results have to be deterministic
    /// across implementations.
    Lazy,
}

/// Configuration consumed by engine construction.
///
/// Holds one toggle per gated Wasm proposal, the fuel metering switch and the
/// compilation mode. An engine copies the configuration it is built from, so
/// changing a `Config` afterwards never affects engines built earlier.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Executions consume fuel.
    #[serde(default)]
    consume_fuel: bool,

    /// Custom sections are dropped when parsing modules.
    #[serde(default)]
    ignore_custom_sections: bool,

    #[serde(default = "defaults::enabled")]
    mutable_global: bool,

    #[serde(default = "defaults::enabled")]
    multi_value: bool,

    #[serde(default = "defaults::enabled")]
    sign_extension: bool,

    #[serde(default = "defaults::enabled")]
    saturating_float_to_int: bool,

    #[serde(default = "defaults::enabled")]
    bulk_memory: bool,

    #[serde(default = "defaults::enabled")]
    reference_types: bool,

    #[serde(default = "defaults::enabled")]
    tail_call: bool,

    #[serde(default = "defaults::enabled")]
    extended_const: bool,

    /// `f32` and `f64` types and instructions.
    #[serde(default = "defaults::enabled")]
    floats: bool,

    #[serde(default = "defaults::enabled")]
    multi_memory: bool,

    #[serde(default = "defaults::enabled")]
    memory64: bool,

    #[serde(default)]
    custom_page_sizes: bool,

    #[serde(default)]
    compilation_mode: CompilationMode,

    #[serde(default)]
    fuel_costs: FuelCosts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consume_fuel: false,
            ignore_custom_sections: false,
            mutable_global: defaults::enabled(),
            multi_value: defaults::enabled(),
            sign_extension: defaults::enabled(),
            saturating_float_to_int: defaults::enabled(),
            bulk_memory: defaults::enabled(),
            reference_types: defaults::enabled(),
            tail_call: defaults::enabled(),
            extended_const: defaults::enabled(),
            floats: defaults::enabled(),
            multi_memory: defaults::enabled(),
            memory64: true,
            custom_page_sizes: false,
            compilation_mode: CompilationMode::default(),
            fuel_costs: FuelCosts::default(),
        }
    }
}

impl Config {
    /// Configures whether executions consume fuel.
    ///
    /// Stores of an engine built with fuel enabled start with no fuel, so
    /// use the context's `set_fuel` before executing anything.
    ///
    /// Disabled by default.
    pub fn consume_fuel(&mut self, enable: bool) -> &mut Self {
        self.consume_fuel = enable;
        self
    }

    /// Configures whether custom sections are ignored when parsing modules.
    ///
    /// Disabled by default.
    pub fn ignore_custom_sections(&mut self, enable: bool) -> &mut Self {
        self.ignore_custom_sections = enable;
        self
    }

    /// Enable or disable the [`mutable-global`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`mutable-global`]: https://github.com/WebAssembly/mutable-global
    pub fn wasm_mutable_global(&mut self, enable: bool) -> &mut Self {
        self.mutable_global = enable;
        self
    }

    /// Enable or disable the [`multi-value`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`multi-value`]: https://github.com/WebAssembly/multi-value
    pub fn wasm_multi_value(&mut self, enable: bool) -> &mut Self {
        self.multi_value = enable;
        self
    }

    /// Enable or disable the [`sign-extension`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`sign-extension`]: https://github.com/WebAssembly/sign-extension-ops
    pub fn wasm_sign_extension(&mut self, enable: bool) -> &mut Self {
        self.sign_extension = enable;
        self
    }

    /// Enable or disable the [`saturating-float-to-int`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`saturating-float-to-int`]:
    /// https://github.com/WebAssembly/nontrapping-float-to-int-conversions
    pub fn wasm_saturating_float_to_int(&mut self, enable: bool) -> &mut Self {
        self.saturating_float_to_int = enable;
        self
    }

    /// Enable or disable the [`bulk-memory`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`bulk-memory`]: https://github.com/WebAssembly/bulk-memory-operations
    pub fn wasm_bulk_memory(&mut self, enable: bool) -> &mut Self {
        self.bulk_memory = enable;
        self
    }

    /// Enable or disable the [`reference-types`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`reference-types`]: https://github.com/WebAssembly/reference-types
    pub fn wasm_reference_types(&mut self, enable: bool) -> &mut Self {
        self.reference_types = enable;
        self
    }

    /// Enable or disable the [`tail-call`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`tail-call`]: https://github.com/WebAssembly/tail-call
    pub fn wasm_tail_call(&mut self, enable: bool) -> &mut Self {
        self.tail_call = enable;
        self
    }

    /// Enable or disable the [`extended-const`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`extended-const`]: https://github.com/WebAssembly/extended-const
    pub fn wasm_extended_const(&mut self, enable: bool) -> &mut Self {
        self.extended_const = enable;
        self
    }

    /// Enable or disable `f32` and `f64` types and instructions.
    ///
    /// Enabled by default.
    pub fn floats(&mut self, enable: bool) -> &mut Self {
        self.floats = enable;
        self
    }

    /// Enable or disable the [`multi-memory`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`multi-memory`]: https://github.com/WebAssembly/multi-memory
    pub fn wasm_multi_memory(&mut self, enable: bool) -> &mut Self {
        self.multi_memory = enable;
        self
    }

    /// Enable or disable the [`memory64`] proposal.
    ///
    /// Enabled by default.
    ///
    /// [`memory64`]: https://github.com/WebAssembly/memory64
    pub fn wasm_memory64(&mut self, enable: bool) -> &mut Self {
        self.memory64 = enable;
        self
    }

    /// Enable or disable the [`custom-page-sizes`] proposal.
    ///
    /// Disabled by default.
    ///
    /// [`custom-page-sizes`]: https://github.com/WebAssembly/custom-page-sizes
    pub fn wasm_custom_page_sizes(&mut self, enable: bool) -> &mut Self {
        self.custom_page_sizes = enable;
        self
    }

    /// Sets the [`CompilationMode`].
    ///
    /// By default [`CompilationMode::Eager`] is used.
    pub fn compilation_mode(&mut self, mode: CompilationMode) -> &mut Self {
        self.compilation_mode = mode;
        self
    }

    /// Sets the [`FuelCosts`] executors charge.
    pub fn fuel_costs(&mut self, costs: FuelCosts) -> &mut Self {
        self.fuel_costs = costs;
        self
    }

    /// Returns `true` if executions consume fuel.
    pub fn get_consume_fuel(&self) -> bool {
        self.consume_fuel
    }

    /// Returns `true` if custom sections are ignored.
    pub fn get_ignore_custom_sections(&self) -> bool {
        self.ignore_custom_sections
    }

    pub fn get_mutable_global(&self) -> bool {
        self.mutable_global
    }

    pub fn get_multi_value(&self) -> bool {
        self.multi_value
    }

    pub fn get_sign_extension(&self) -> bool {
        self.sign_extension
    }

    pub fn get_saturating_float_to_int(&self) -> bool {
        self.saturating_float_to_int
    }

    pub fn get_bulk_memory(&self) -> bool {
        self.bulk_memory
    }

    pub fn get_reference_types(&self) -> bool {
        self.reference_types
    }

    pub fn get_tail_call(&self) -> bool {
        self.tail_call
    }

    pub fn get_extended_const(&self) -> bool {
        self.extended_const
    }

    pub fn get_floats(&self) -> bool {
        self.floats
    }

    pub fn get_multi_memory(&self) -> bool {
        self.multi_memory
    }

    pub fn get_memory64(&self) -> bool {
        self.memory64
    }

    pub fn get_custom_page_sizes(&self) -> bool {
        self.custom_page_sizes
    }

    /// Returns the configured [`CompilationMode`].
    pub fn get_compilation_mode(&self) -> CompilationMode {
        self.compilation_mode
    }

    /// Returns the configured [`FuelCosts`].
    pub fn get_fuel_costs(&self) -> &FuelCosts {
        &self.fuel_costs
    }
}

/// Fuel prices of the units of work an executor performs.
///
/// Every category defaults to the base cost of 1. Bulk operations charge one
/// unit of fuel per [`FuelCosts::bytes_per_fuel`] bytes copied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FuelCosts {
    #[serde(default = "defaults::base_cost")]
    base: u64,

    #[serde(default = "defaults::base_cost")]
    load: u64,

    #[serde(default = "defaults::base_cost")]
    store: u64,

    /// Instructions that touch instance entities (globals, memories, tables, functions).
    #[serde(default = "defaults::base_cost")]
    instance: u64,

    #[serde(default = "defaults::base_cost")]
    call: u64,

    #[serde(default = "defaults::base_cost")]
    simd: u64,

    #[serde(default = "defaults::bytes_per_fuel")]
    bytes_per_fuel: NonZeroU64,
}

impl Default for FuelCosts {
    fn default() -> Self {
        Self::uniform(defaults::base_cost())
    }
}

impl FuelCosts {
    /// Creates costs that charge `base` for every category.
    pub fn uniform(base: u64) -> Self {
        Self {
            base,
            load: base,
            store: base,
            instance: base,
            call: base,
            simd: base,
            bytes_per_fuel: defaults::bytes_per_fuel(),
        }
    }

    pub fn with_load(mut self, cost: u64) -> Self {
        self.load = cost;
        self
    }

    pub fn with_store(mut self, cost: u64) -> Self {
        self.store = cost;
        self
    }

    pub fn with_instance(mut self, cost: u64) -> Self {
        self.instance = cost;
        self
    }

    pub fn with_call(mut self, cost: u64) -> Self {
        self.call = cost;
        self
    }

    pub fn with_simd(mut self, cost: u64) -> Self {
        self.simd = cost;
        self
    }

    pub fn with_bytes_per_fuel(mut self, bytes: NonZeroU64) -> Self {
        self.bytes_per_fuel = bytes;
        self
    }

    /// Returns the base cost of a unit of work.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn store(&self) -> u64 {
        self.store
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn call(&self) -> u64 {
        self.call
    }

    pub fn simd(&self) -> u64 {
        self.simd
    }

    /// Returns the number of bytes copied per unit of fuel.
    pub fn bytes_per_fuel(&self) -> NonZeroU64 {
        self.bytes_per_fuel
    }

    /// Returns the cost of copying `len_bytes` bytes.
    pub fn fuel_for_copying_bytes(&self, len_bytes: u64) -> u64 {
        len_bytes / self.bytes_per_fuel
    }

    /// Returns the cost of copying `len_values` values of type `T`.
    ///
    /// Saturates at [`u64::MAX`] on overflow.
    pub fn fuel_for_copying_values<T>(&self, len_values: u64) -> u64 {
        let Ok(bytes_per_value) = u64::try_from(mem::size_of::<T>()) else {
            return u64::MAX;
        };
        let len_bytes = len_values.saturating_mul(bytes_per_value);
        self.fuel_for_copying_bytes(len_bytes)
    }
}

/// Per-store configuration.
///
/// These settings control resources of individual stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Fuel a store starts with.
    ///
    /// Requires an engine with fuel metering enabled.
    #[serde(default)]
    pub initial_fuel: Option<u64>,

    /// Handle table slots reserved when the store is created.
    #[serde(default)]
    pub initial_handles: usize,

    /// Maximum number of live objects in the handle table.
    #[serde(default)]
    pub max_handles: Option<usize>,
}

/// Default value functions for serde.
mod defaults {
    use std::num::NonZeroU64;

    pub const fn enabled() -> bool {
        true
    }

    pub const fn base_cost() -> u64 {
        1
    }

    pub const fn bytes_per_fuel() -> NonZeroU64 {
        NonZeroU64::new(64).expect("64 is non-zero")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(!config.get_consume_fuel());
        assert!(!config.get_ignore_custom_sections());
        assert!(config.get_mutable_global());
        assert!(config.get_multi_value());
        assert!(config.get_sign_extension());
        assert!(config.get_saturating_float_to_int());
        assert!(config.get_bulk_memory());
        assert!(config.get_reference_types());
        assert!(config.get_tail_call());
        assert!(config.get_extended_const());
        assert!(config.get_floats());
        assert!(config.get_multi_memory());
        assert!(config.get_memory64());
        assert!(!config.get_custom_page_sizes());
        assert_eq!(config.get_compilation_mode(), CompilationMode::Eager);
    }

    #[test]
    fn test_setters_chain() {
        let mut config = Config::default();
        config
            .consume_fuel(true)
            .wasm_tail_call(false)
            .floats(false)
            .compilation_mode(CompilationMode::Lazy);

        assert!(config.get_consume_fuel());
        assert!(!config.get_tail_call());
        assert!(!config.get_floats());
        assert_eq!(config.get_compilation_mode(), CompilationMode::Lazy);
        // Untouched toggles keep their defaults
        assert!(config.get_bulk_memory());
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"engine": {"consume_fuel": true, "tail_call": false}}"#;
        let config: HostConfig = serde_json::from_str(json).unwrap();

        assert!(config.engine.get_consume_fuel());
        assert!(!config.engine.get_tail_call());
        // Default values for unspecified fields
        assert!(config.engine.get_reference_types());
        assert!(config.engine.get_memory64());
        assert!(!config.engine.get_custom_page_sizes());
        assert_eq!(config.engine.get_fuel_costs(), &FuelCosts::default());
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_compilation_mode_names() {
        let json = r#"{"compilation_mode": "lazy_translation"}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.get_compilation_mode(),
            CompilationMode::LazyTranslation
        );
    }

    #[test]
    fn test_fuel_costs_default() {
        let costs = FuelCosts::default();

        assert_eq!(costs.base(), 1);
        assert_eq!(costs.load(), 1);
        assert_eq!(costs.call(), 1);
        assert_eq!(costs.bytes_per_fuel().get(), 64);
    }

    #[test]
    fn test_fuel_costs_overrides() {
        let costs = FuelCosts::uniform(2).with_call(10).with_load(3);

        assert_eq!(costs.base(), 2);
        assert_eq!(costs.store(), 2);
        assert_eq!(costs.call(), 10);
        assert_eq!(costs.load(), 3);
    }

    #[test]
    fn test_fuel_for_copying() {
        let costs = FuelCosts::default();

        assert_eq!(costs.fuel_for_copying_bytes(0), 0);
        assert_eq!(costs.fuel_for_copying_bytes(63), 0);
        assert_eq!(costs.fuel_for_copying_bytes(128), 2);
        // 16 * 8 bytes = 128 bytes
        assert_eq!(costs.fuel_for_copying_values::<u64>(16), 2);
    }

    #[test]
    fn test_fuel_for_copying_saturates() {
        let costs = FuelCosts::default().with_bytes_per_fuel(NonZeroU64::MIN);

        assert_eq!(costs.fuel_for_copying_values::<u64>(u64::MAX), u64::MAX);
    }
}
