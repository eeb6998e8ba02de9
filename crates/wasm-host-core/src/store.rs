//! The unit of isolation.
//!
//! This module provides:
//! - [`Store`]: Owns runtime objects, embedder data and the fuel meter
//! - [`EmbedderData`] and [`Finalizer`]: Opaque host data and its single-shot cleanup

use std::any::Any;

use tracing::{debug, instrument};

use wasm_host_common::{RuntimeError, StoreConfig, Trap};

use crate::context::{StoreContext, StoreContextMut};
use crate::executor::CallHook;
use crate::fuel::Fuel;
use crate::handle::{HandleTable, StoreId};
use crate::Engine;

/// Opaque data the embedder attaches to a store.
pub type EmbedderData = Box<dyn Any + Send>;

/// Cleanup run exactly once when a store is destroyed.
///
/// Receives the embedder data current at that time, which is not
/// necessarily the value the store was created with.
pub type Finalizer = Box<dyn FnOnce(Option<EmbedderData>) + Send>;

pub(crate) type CallHookFn =
    Box<dyn FnMut(StoreContextMut<'_>, CallHook) -> Result<(), Trap> + Send>;

/// Owner of all state created during one embedding session.
///
/// A store holds the runtime objects created through it, the embedder's data
/// slot, a fuel meter and a handle to the [`Engine`] it was created from. All
/// of it is reached through [`Store::context`] and [`Store::context_mut`].
///
/// # Thread Safety
///
/// `Store` is `Send` but not `Sync`: it may be created on one thread and
/// moved to another, but only one thread can drive it at a time.
pub struct Store {
    pub(crate) id: StoreId,
    pub(crate) handles: HandleTable,
    pub(crate) fuel: Fuel,
    pub(crate) data: Option<EmbedderData>,
    finalizer: Option<Finalizer>,
    pub(crate) call_hook: Option<CallHookFn>,
    /// Declared last so it is released after the finalizer has run.
    pub(crate) engine: Engine,
}

impl Store {
    /// Create a new store for `engine`.
    ///
    /// The store keeps the engine alive for its whole lifetime. If fuel
    /// metering is enabled the store starts without fuel.
    ///
    /// # Panics
    ///
    /// If the process has run out of store identifiers. Use
    /// [`Store::try_new`] to get an error instead.
    pub fn new(engine: &Engine, data: Option<EmbedderData>, finalizer: Option<Finalizer>) -> Self {
        let id = StoreId::new();
        Self::assemble(id, HandleTable::new(id), engine, data, finalizer)
    }

    /// Create a new store with the limits and initial fuel of `config`.
    ///
    /// Either the store is fully built or nothing is: on failure `data` is
    /// dropped and `finalizer` never runs.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `initial_fuel` is set but the engine does not consume fuel
    /// - `initial_handles` exceeds `max_handles`
    /// - The handle table cannot reserve `initial_handles` slots
    /// - The process has run out of store identifiers
    #[instrument(skip(engine, data, finalizer))]
    pub fn try_new(
        engine: &Engine,
        config: &StoreConfig,
        data: Option<EmbedderData>,
        finalizer: Option<Finalizer>,
    ) -> Result<Self, RuntimeError> {
        if config.initial_fuel.is_some() && !engine.config().get_consume_fuel() {
            return Err(RuntimeError::FuelMeteringDisabled);
        }
        if let Some(max_handles) = config.max_handles {
            if config.initial_handles > max_handles {
                return Err(RuntimeError::invalid_config(format!(
                    "initial_handles ({}) exceeds max_handles ({max_handles})",
                    config.initial_handles
                )));
            }
        }

        let id = StoreId::try_new().ok_or_else(|| {
            RuntimeError::resource_exhausted("store ids", "store identifiers exhausted")
        })?;
        let handles = HandleTable::with_capacity(id, config.initial_handles, config.max_handles)?;
        let mut store = Self::assemble(id, handles, engine, data, finalizer);

        if let Some(fuel) = config.initial_fuel {
            store.fuel.set_fuel(fuel)?;
        }

        Ok(store)
    }

    fn assemble(
        id: StoreId,
        handles: HandleTable,
        engine: &Engine,
        data: Option<EmbedderData>,
        finalizer: Option<Finalizer>,
    ) -> Self {
        let config = engine.config();
        let fuel = Fuel::new(config.get_consume_fuel(), config.get_fuel_costs().clone());

        debug!(store = %id, fuel_enabled = fuel.is_enabled(), "Store created");

        Self {
            id,
            handles,
            fuel,
            data,
            finalizer,
            call_hook: None,
            engine: engine.clone(),
        }
    }

    /// Destroy the store.
    ///
    /// Releases every owned object, runs the finalizer on the current
    /// embedder data and releases the engine handle. Dropping a store has
    /// the same effect.
    pub fn destroy(self) {
        drop(self);
    }

    /// Returns the shared context of this store.
    pub fn context(&self) -> StoreContext<'_> {
        StoreContext { store: self }
    }

    /// Returns the exclusive context of this store.
    pub fn context_mut(&mut self) -> StoreContextMut<'_> {
        StoreContextMut { store: self }
    }

    /// Returns the [`Engine`] that this store is associated with.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the unique identifier of this store.
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Install a callback run whenever execution enters or leaves an
    /// executor driven through [`crate::execute`].
    ///
    /// An error returned by the callback halts the execution with that trap.
    pub fn call_hook(
        &mut self,
        hook: impl FnMut(StoreContextMut<'_>, CallHook) -> Result<(), Trap> + Send + 'static,
    ) {
        self.call_hook = Some(Box::new(hook));
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let released = self.handles.len();
        self.handles.clear();
        if let Some(finalizer) = self.finalizer.take() {
            finalizer(self.data.take());
        }
        debug!(store = %self.id, released, "Store destroyed");
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("handles", &self.handles)
            .field("fuel", &self.fuel.state())
            .field("has_data", &self.data.is_some())
            .field("has_finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}
