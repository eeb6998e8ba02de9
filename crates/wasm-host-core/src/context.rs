//! Borrowed views into a [`Store`].
//!
//! A context is the only way to reach store-owned state: embedder data, the
//! fuel meter and the handle table. Contexts borrow the store, so they can
//! neither outlive it nor be created without one.

use std::any::Any;
use std::mem;

use wasm_host_common::{FuelCosts, RuntimeError, Trap};

use crate::fuel::FuelState;
use crate::handle::{Handle, StoreId};
use crate::store::{EmbedderData, Store};
use crate::Engine;

/// A shared view into a [`Store`].
#[derive(Clone, Copy)]
pub struct StoreContext<'a> {
    pub(crate) store: &'a Store,
}

/// An exclusive view into a [`Store`].
pub struct StoreContextMut<'a> {
    pub(crate) store: &'a mut Store,
}

/// Types that give shared access to a store.
pub trait AsContext {
    /// Returns the shared context of the underlying store.
    fn as_context(&self) -> StoreContext<'_>;
}

/// Types that give exclusive access to a store.
pub trait AsContextMut: AsContext {
    /// Returns the exclusive context of the underlying store.
    fn as_context_mut(&mut self) -> StoreContextMut<'_>;
}

impl<'a> StoreContext<'a> {
    /// Returns the [`Engine`] of the store.
    pub fn engine(&self) -> &'a Engine {
        &self.store.engine
    }

    /// Returns the identifier of the store.
    pub fn store_id(&self) -> StoreId {
        self.store.id
    }

    /// Returns the embedder data, if any.
    pub fn data(&self) -> Option<&'a (dyn Any + Send + 'static)> {
        self.store.data.as_deref()
    }

    /// Returns the embedder data if it is a `T`.
    pub fn data_as<T: Any>(&self) -> Option<&'a T> {
        self.data()?.downcast_ref()
    }

    /// Returns the remaining fuel.
    ///
    /// # Errors
    ///
    /// If fuel metering is disabled.
    pub fn get_fuel(&self) -> Result<u64, RuntimeError> {
        Ok(self.store.fuel.get_fuel()?)
    }

    /// Returns the state of the fuel meter.
    pub fn fuel_state(&self) -> FuelState {
        self.store.fuel.state()
    }

    /// Resolves `handle` to the object it refers to.
    ///
    /// # Errors
    ///
    /// If the handle belongs to another store, is stale or names another type.
    pub fn get<T: Any>(&self, handle: &Handle<T>) -> Result<&'a T, RuntimeError> {
        self.store.handles.get(handle)
    }

    /// Returns `true` if `handle` resolves in this store.
    pub fn contains<T: Any>(&self, handle: &Handle<T>) -> bool {
        self.store.handles.contains(handle)
    }

    /// Number of live objects owned by the store.
    pub fn len_handles(&self) -> usize {
        self.store.handles.len()
    }
}

impl StoreContextMut<'_> {
    /// Returns the [`Engine`] of the store.
    pub fn engine(&self) -> &Engine {
        &self.store.engine
    }

    /// Returns the identifier of the store.
    pub fn store_id(&self) -> StoreId {
        self.store.id
    }

    /// Returns the embedder data, if any.
    pub fn data(&self) -> Option<&(dyn Any + Send + 'static)> {
        self.store.data.as_deref()
    }

    /// Returns the embedder data if it is a `T`.
    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data()?.downcast_ref()
    }

    /// Returns the embedder data for mutation, if any.
    pub fn data_mut(&mut self) -> Option<&mut (dyn Any + Send + 'static)> {
        self.store.data.as_deref_mut()
    }

    /// Returns the embedder data for mutation if it is a `T`.
    pub fn data_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data_mut()?.downcast_mut()
    }

    /// Replaces the embedder data and returns the previous value.
    ///
    /// The finalizer is not run on the returned value; it only ever sees the
    /// data current when the store is destroyed.
    pub fn set_data(&mut self, data: Option<EmbedderData>) -> Option<EmbedderData> {
        mem::replace(&mut self.store.data, data)
    }

    /// Sets the remaining fuel to `fuel`.
    ///
    /// # Errors
    ///
    /// If fuel metering is disabled.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), RuntimeError> {
        Ok(self.store.fuel.set_fuel(fuel)?)
    }

    /// Returns the remaining fuel.
    ///
    /// # Errors
    ///
    /// If fuel metering is disabled.
    pub fn get_fuel(&self) -> Result<u64, RuntimeError> {
        Ok(self.store.fuel.get_fuel()?)
    }

    /// Returns the state of the fuel meter.
    pub fn fuel_state(&self) -> FuelState {
        self.store.fuel.state()
    }

    /// Charges the amount `f` computes from the store's [`FuelCosts`].
    ///
    /// Returns the remaining fuel.
    ///
    /// # Errors
    ///
    /// - If fuel metering is disabled.
    /// - If out of fuel, in which case the meter is left at zero.
    pub fn consume_fuel(&mut self, f: impl FnOnce(&FuelCosts) -> u64) -> Result<u64, RuntimeError> {
        Ok(self.store.fuel.consume_fuel(f)?)
    }

    /// Charges fuel like [`StoreContextMut::consume_fuel`] when metering is
    /// enabled and does nothing otherwise.
    ///
    /// # Errors
    ///
    /// If out of fuel.
    pub fn consume_fuel_if(&mut self, f: impl FnOnce(&FuelCosts) -> u64) -> Result<(), Trap> {
        self.store.fuel.consume_fuel_if(f)
    }

    /// Moves `value` into the store and returns a handle to it.
    ///
    /// # Errors
    ///
    /// If the store's handle limit is reached or memory cannot be reserved.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Result<Handle<T>, RuntimeError> {
        self.store.handles.insert(value)
    }

    /// Resolves `handle` to the object it refers to.
    ///
    /// # Errors
    ///
    /// If the handle belongs to another store, is stale or names another type.
    pub fn get<T: Any>(&self, handle: &Handle<T>) -> Result<&T, RuntimeError> {
        self.store.handles.get(handle)
    }

    /// Resolves `handle` to the object it refers to, for mutation.
    ///
    /// # Errors
    ///
    /// Same as [`StoreContextMut::get`].
    pub fn get_mut<T: Any>(&mut self, handle: &Handle<T>) -> Result<&mut T, RuntimeError> {
        self.store.handles.get_mut(handle)
    }

    /// Removes the object behind `handle` from the store and returns it.
    ///
    /// Every copy of `handle` is stale afterwards.
    ///
    /// # Errors
    ///
    /// If the handle belongs to another store, is stale or names another type.
    pub fn remove<T: Any>(&mut self, handle: Handle<T>) -> Result<T, RuntimeError> {
        self.store.handles.remove(handle)
    }

    /// Returns `true` if `handle` resolves in this store.
    pub fn contains<T: Any>(&self, handle: &Handle<T>) -> bool {
        self.store.handles.contains(handle)
    }

    /// Number of live objects owned by the store.
    pub fn len_handles(&self) -> usize {
        self.store.handles.len()
    }
}

impl AsContext for Store {
    fn as_context(&self) -> StoreContext<'_> {
        self.context()
    }
}

impl AsContextMut for Store {
    fn as_context_mut(&mut self) -> StoreContextMut<'_> {
        self.context_mut()
    }
}

impl AsContext for StoreContext<'_> {
    fn as_context(&self) -> StoreContext<'_> {
        StoreContext { store: self.store }
    }
}

impl AsContext for StoreContextMut<'_> {
    fn as_context(&self) -> StoreContext<'_> {
        StoreContext { store: &*self.store }
    }
}

impl AsContextMut for StoreContextMut<'_> {
    fn as_context_mut(&mut self) -> StoreContextMut<'_> {
        StoreContextMut {
            store: &mut *self.store,
        }
    }
}

impl<T: AsContext + ?Sized> AsContext for &T {
    fn as_context(&self) -> StoreContext<'_> {
        T::as_context(&**self)
    }
}

impl<T: AsContext + ?Sized> AsContext for &mut T {
    fn as_context(&self) -> StoreContext<'_> {
        T::as_context(&**self)
    }
}

impl<T: AsContextMut + ?Sized> AsContextMut for &mut T {
    fn as_context_mut(&mut self) -> StoreContextMut<'_> {
        T::as_context_mut(&mut **self)
    }
}

impl std::fmt::Debug for StoreContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StoreContext").field(&self.store.id).finish()
    }
}

impl std::fmt::Debug for StoreContextMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StoreContextMut").field(&self.store.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wasm_host_common::Config;

    fn fuel_store() -> Store {
        let mut config = Config::default();
        config.consume_fuel(true);
        Store::new(&Engine::new(&config), None, None)
    }

    #[test]
    fn test_data_roundtrip() {
        let mut store = Store::new(&Engine::default(), Some(Box::new(7_i64)), None);

        assert_eq!(store.context().data_as::<i64>(), Some(&7));
        assert_eq!(store.context().data_as::<u8>(), None);

        *store.context_mut().data_as_mut::<i64>().unwrap() += 1;
        assert_eq!(store.context_mut().data_as::<i64>(), Some(&8));
    }

    #[test]
    fn test_contexts_are_equivalent() {
        let mut store = fuel_store();
        store.context_mut().set_fuel(42).unwrap();

        assert_eq!(store.context().get_fuel(), Ok(42));
        assert_eq!(store.context_mut().get_fuel(), Ok(42));
        assert_eq!(store.context().store_id(), store.id());
    }

    #[test]
    fn test_set_data_returns_previous() {
        let mut store = Store::new(&Engine::default(), Some(Box::new("d1")), None);

        let previous = store.context_mut().set_data(Some(Box::new("d2")));

        assert_eq!(previous.unwrap().downcast_ref::<&str>(), Some(&"d1"));
        assert_eq!(store.context().data_as::<&str>(), Some(&"d2"));
    }

    #[test]
    fn test_finalizer_sees_replaced_data() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut store = Store::new(
            &Engine::default(),
            Some(Box::new("d1")),
            Some(Box::new(move |data: Option<EmbedderData>| {
                let value = data.and_then(|d| d.downcast_ref::<&str>().copied());
                log.lock().unwrap().push(value);
            })),
        );

        drop(store.context_mut().set_data(Some(Box::new("d2"))));
        assert!(seen.lock().unwrap().is_empty());

        store.destroy();
        assert_eq!(*seen.lock().unwrap(), vec![Some("d2")]);
    }

    #[test]
    fn test_fuel_disabled_through_context() {
        let mut store = Store::new(&Engine::default(), None, None);
        let mut ctx = store.context_mut();

        assert_eq!(ctx.get_fuel(), Err(RuntimeError::FuelMeteringDisabled));
        assert!(ctx.set_fuel(1).unwrap_err().is_configuration_error());
        assert_eq!(ctx.fuel_state(), FuelState::Disabled);
        assert_eq!(ctx.consume_fuel_if(FuelCosts::call), Ok(()));
    }

    #[test]
    fn test_consume_fuel_through_context() {
        let mut store = fuel_store();
        let mut ctx = store.context_mut();
        ctx.set_fuel(3).unwrap();

        assert_eq!(ctx.consume_fuel(FuelCosts::base), Ok(2));
        let err = ctx.consume_fuel(|_| 5).unwrap_err();
        assert!(err.is_trap());
        assert!(err.is_resource_limit());
        assert_eq!(ctx.fuel_state(), FuelState::Enabled { remaining: 0 });
    }

    #[test]
    fn test_handles_through_context() {
        let mut store = Store::new(&Engine::default(), None, None);
        let mut ctx = store.context_mut();

        let handle = ctx.insert(String::from("global")).unwrap();
        ctx.get_mut(&handle).unwrap().push_str("-0");

        assert_eq!(ctx.get(&handle).unwrap(), "global-0");
        assert_eq!(ctx.len_handles(), 1);
        assert_eq!(ctx.remove(handle).unwrap(), "global-0");
        assert!(!ctx.contains(&handle));
        assert_eq!(ctx.get(&handle), Err(RuntimeError::StaleHandle));
    }

    #[test]
    fn test_as_context_generic() {
        fn remaining(ctx: impl AsContext) -> Result<u64, RuntimeError> {
            ctx.as_context().get_fuel()
        }

        fn refill(mut ctx: impl AsContextMut, fuel: u64) {
            ctx.as_context_mut().set_fuel(fuel).unwrap();
        }

        let mut store = fuel_store();
        refill(&mut store, 9);
        assert_eq!(remaining(&store), Ok(9));

        let mut ctx = store.context_mut();
        refill(&mut ctx, 4);
        assert_eq!(remaining(&ctx), Ok(4));
        assert_eq!(remaining(ctx.as_context()), Ok(4));
    }
}
