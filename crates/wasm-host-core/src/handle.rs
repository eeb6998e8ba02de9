//! Store-owned object table.
//!
//! Runtime objects created during a store's lifetime live in its
//! [`HandleTable`] and are addressed through typed [`Handle`]s. A handle
//! records the store that created it and the generation of its slot, so it
//! never resolves in another store and never resolves to an object that
//! replaced the one it was created for.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use wasm_host_common::RuntimeError;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// A unique store identifier.
///
/// Identifiers are never reused within a process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    /// Returns a new unique [`StoreId`].
    ///
    /// # Panics
    ///
    /// If every identifier has been handed out.
    pub(crate) fn new() -> Self {
        Self::try_new().unwrap_or_else(|| panic!("store identifiers exhausted"))
    }

    /// Returns a new unique [`StoreId`], or `None` once every identifier has
    /// been handed out.
    pub(crate) fn try_new() -> Option<Self> {
        Self::next_from(&NEXT_STORE_ID)
    }

    /// Takes the next identifier from `counter`. The counter stops at
    /// `u64::MAX` instead of wrapping.
    fn next_from(counter: &AtomicU64) -> Option<Self> {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
            .ok()
            .map(Self)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// A typed reference to an object owned by a store.
///
/// Handles are plain values: copying one does not copy the object, and a
/// handle outliving its object simply stops resolving.
pub struct Handle<T> {
    store: StoreId,
    index: u32,
    generation: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Returns the [`StoreId`] of the store owning the object.
    pub fn store_id(&self) -> StoreId {
        self.store
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.store == other.store && self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store.hash(state);
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("type", &type_name::<T>())
            .field("store", &self.store)
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

struct Slot {
    generation: u32,
    value: Option<Box<dyn Any + Send>>,
}

/// Generational arena of the objects owned by one store.
pub struct HandleTable {
    store: StoreId,
    slots: Vec<Slot>,
    /// Indices of vacant slots, reused last-in first-out.
    free: Vec<u32>,
    len: usize,
    max_len: Option<usize>,
}

impl HandleTable {
    /// Creates an empty table for the store `store`.
    pub(crate) fn new(store: StoreId) -> Self {
        Self {
            store,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            max_len: None,
        }
    }

    /// Creates a table with `capacity` slots reserved up front.
    ///
    /// # Errors
    ///
    /// If the allocation fails.
    pub(crate) fn with_capacity(
        store: StoreId,
        capacity: usize,
        max_len: Option<usize>,
    ) -> Result<Self, RuntimeError> {
        let mut table = Self::new(store);
        table.slots.try_reserve_exact(capacity).map_err(|e| {
            RuntimeError::resource_exhausted("handle table", format!("cannot reserve {capacity} slots: {e}"))
        })?;
        table.max_len = max_len;
        Ok(table)
    }

    /// Returns the number of live objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the configured limit on live objects, if any.
    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    /// Moves `value` into the table and returns a handle to it.
    ///
    /// # Errors
    ///
    /// If the table limit is reached or growing the table fails.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Result<Handle<T>, RuntimeError> {
        if let Some(max_len) = self.max_len {
            if self.len >= max_len {
                return Err(RuntimeError::resource_exhausted(
                    "handle table",
                    format!("limit of {max_len} objects reached"),
                ));
            }
        }

        let value: Box<dyn Any + Send> = Box::new(value);
        let (index, generation) = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                (index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    RuntimeError::resource_exhausted("handle table", "slot index space exhausted")
                })?;
                self.slots.try_reserve(1).map_err(|e| {
                    RuntimeError::resource_exhausted("handle table", e.to_string())
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                (index, 0)
            }
        };
        self.len += 1;

        Ok(Handle {
            store: self.store,
            index,
            generation,
            marker: PhantomData,
        })
    }

    fn slot<T>(&self, handle: &Handle<T>) -> Result<&Slot, RuntimeError> {
        if handle.store != self.store {
            return Err(RuntimeError::StoreMismatch);
        }
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => Ok(slot),
            _ => Err(RuntimeError::StaleHandle),
        }
    }

    fn slot_mut<T>(&mut self, handle: &Handle<T>) -> Result<&mut Slot, RuntimeError> {
        if handle.store != self.store {
            return Err(RuntimeError::StoreMismatch);
        }
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.value.is_some() => Ok(slot),
            _ => Err(RuntimeError::StaleHandle),
        }
    }

    /// Returns `true` if `handle` resolves to a live object of this table.
    pub fn contains<T: Any>(&self, handle: &Handle<T>) -> bool {
        self.get(handle).is_ok()
    }

    /// Returns a shared reference to the object behind `handle`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::StoreMismatch`] if `handle` belongs to another store.
    /// - [`RuntimeError::StaleHandle`] if the object was removed.
    pub fn get<T: Any>(&self, handle: &Handle<T>) -> Result<&T, RuntimeError> {
        self.slot(handle)?
            .value
            .as_deref()
            .and_then(|value| value.downcast_ref::<T>())
            .ok_or(RuntimeError::HandleTypeMismatch {
                expected: type_name::<T>(),
            })
    }

    /// Returns an exclusive reference to the object behind `handle`.
    ///
    /// # Errors
    ///
    /// Same as [`HandleTable::get`].
    pub fn get_mut<T: Any>(&mut self, handle: &Handle<T>) -> Result<&mut T, RuntimeError> {
        self.slot_mut(handle)?
            .value
            .as_deref_mut()
            .and_then(|value| value.downcast_mut::<T>())
            .ok_or(RuntimeError::HandleTypeMismatch {
                expected: type_name::<T>(),
            })
    }

    /// Removes the object behind `handle` and returns it.
    ///
    /// Every copy of `handle` is stale afterwards.
    ///
    /// # Errors
    ///
    /// Same as [`HandleTable::get`].
    pub fn remove<T: Any>(&mut self, handle: Handle<T>) -> Result<T, RuntimeError> {
        // Check the type first so a mismatch leaves the object in place.
        self.get(&handle)?;
        let slot = self.slot_mut(&handle)?;
        let value = slot.value.take().ok_or(RuntimeError::StaleHandle)?;
        // A slot whose generations are used up is retired for good.
        if let Some(generation) = slot.generation.checked_add(1) {
            slot.generation = generation;
            self.free.push(handle.index);
        }
        self.len -= 1;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| RuntimeError::HandleTypeMismatch {
                expected: type_name::<T>(),
            })
    }

    /// Drops every object in the table.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("store", &self.store)
            .field("len", &self.len)
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = HandleTable::new(StoreId::new());
        let a = table.insert(1_u32).unwrap();
        let b = table.insert(String::from("global")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(*table.get(&a).unwrap(), 1);
        assert_eq!(table.get(&b).unwrap(), "global");
    }

    #[test]
    fn test_get_mut() {
        let mut table = HandleTable::new(StoreId::new());
        let handle = table.insert(vec![0_u8; 4]).unwrap();

        table.get_mut(&handle).unwrap().push(1);

        assert_eq!(table.get(&handle).unwrap().len(), 5);
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut table_a = HandleTable::new(StoreId::new());
        let mut table_b = HandleTable::new(StoreId::new());
        let in_a = table_a.insert(7_i64).unwrap();
        let _in_b = table_b.insert(8_i64).unwrap();

        assert_eq!(table_b.get(&in_a), Err(RuntimeError::StoreMismatch));
        assert!(!table_b.contains(&in_a));
    }

    #[test]
    fn test_removed_handle_is_stale() {
        let mut table = HandleTable::new(StoreId::new());
        let handle = table.insert(3_u8).unwrap();

        assert_eq!(table.remove(handle), Ok(3));
        assert_eq!(table.get(&handle), Err(RuntimeError::StaleHandle));
        assert_eq!(table.remove(handle), Err(RuntimeError::StaleHandle));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reused_slot_does_not_resurrect_old_handle() {
        let mut table = HandleTable::new(StoreId::new());
        let old = table.insert(1_u32).unwrap();
        table.remove(old).unwrap();
        let new = table.insert(2_u32).unwrap();

        assert_eq!(old.index, new.index);
        assert_eq!(table.get(&old), Err(RuntimeError::StaleHandle));
        assert_eq!(*table.get(&new).unwrap(), 2);
    }

    #[test]
    fn test_store_ids_do_not_wrap() {
        let counter = AtomicU64::new(u64::from(u32::MAX));
        let first = StoreId::next_from(&counter).unwrap();
        let second = StoreId::next_from(&counter).unwrap();

        assert_ne!(first, second);
        assert_eq!(second, StoreId(1 << 32));

        let counter = AtomicU64::new(u64::MAX - 1);
        assert_eq!(StoreId::next_from(&counter), Some(StoreId(u64::MAX - 1)));
        assert_eq!(StoreId::next_from(&counter), None);
        assert_eq!(StoreId::next_from(&counter), None);
    }

    #[test]
    fn test_handle_from_store_past_u32_range_is_rejected() {
        let counter = AtomicU64::new(0);
        let mut table_a = HandleTable::new(StoreId::next_from(&counter).unwrap());
        let in_a = table_a.insert(41_u32).unwrap();

        counter.store(1 << 32, Ordering::Relaxed);
        let mut table_b = HandleTable::new(StoreId::next_from(&counter).unwrap());
        let in_b = table_b.insert(99_u32).unwrap();

        assert_eq!(in_a.index, in_b.index);
        assert_eq!(table_b.get(&in_a), Err(RuntimeError::StoreMismatch));
    }

    #[test]
    fn test_exhausted_slot_is_retired() {
        let mut table = HandleTable::new(StoreId::new());
        let first = table.insert(1_u32).unwrap();
        table.slots[first.index as usize].generation = u32::MAX;
        let last = Handle::<u32> {
            generation: u32::MAX,
            ..first
        };

        assert_eq!(table.remove(last), Ok(1));
        let next = table.insert(2_u32).unwrap();

        assert_ne!(next.index, first.index);
        assert_eq!(table.get(&last), Err(RuntimeError::StaleHandle));
        assert_eq!(table.get(&first), Err(RuntimeError::StaleHandle));
        assert_eq!(*table.get(&next).unwrap(), 2);
    }

    #[test]
    fn test_max_len_is_enforced() {
        let mut table = HandleTable::with_capacity(StoreId::new(), 2, Some(2)).unwrap();
        let first = table.insert(()).unwrap();
        table.insert(()).unwrap();

        let err = table.insert(()).unwrap_err();
        assert!(err.is_resource_limit());

        // Freeing a slot makes room again
        table.remove(first).unwrap();
        assert!(table.insert(()).is_ok());
    }

    #[test]
    fn test_impossible_reservation_fails() {
        let result = HandleTable::with_capacity(StoreId::new(), usize::MAX, None);

        assert!(matches!(result, Err(RuntimeError::ResourceExhausted { .. })));
    }

    #[test]
    fn test_handle_debug() {
        let mut table = HandleTable::new(StoreId::new());
        let handle = table.insert(0.5_f64).unwrap();

        let debug_str = format!("{handle:?}");
        assert!(debug_str.contains("Handle"));
        assert!(debug_str.contains("f64"));
    }

    proptest! {
        #[test]
        fn test_live_handles_resolve_to_their_values(
            ops in proptest::collection::vec(any::<Option<u16>>(), 1..64),
        ) {
            let mut table = HandleTable::new(StoreId::new());
            let mut live: Vec<(Handle<u16>, u16)> = Vec::new();
            let mut dead: Vec<Handle<u16>> = Vec::new();
            for op in ops {
                match op {
                    Some(value) => live.push((table.insert(value).unwrap(), value)),
                    None => {
                        if let Some((handle, value)) = live.pop() {
                            prop_assert_eq!(table.remove(handle), Ok(value));
                            dead.push(handle);
                        }
                    }
                }
            }
            prop_assert_eq!(table.len(), live.len());
            for (handle, value) in &live {
                prop_assert_eq!(table.get(handle), Ok(value));
            }
            for handle in &dead {
                prop_assert_eq!(table.get(handle), Err(RuntimeError::StaleHandle));
            }
        }
    }
}
