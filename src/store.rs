use std::sync::OnceLock;

use crate::error::StoreError;

/// Per-task partial results, shared between the workers and the barrier action.
///
/// The store holds one slot per task. Each worker owns exactly one slot and writes it exactly
/// once, through the [`SlotWriter`] it gets from [`build_slot_writer`](Self::build_slot_writer).
/// Slots that have not been written yet read as `T::default()`, so an aggregate taken while
/// workers are still pending undercounts instead of failing.
///
/// ## Memory Layout
///
/// ```text
/// Task 0: [partial] | Task 1: [partial] | Task 2: [unwritten -> default] | ...
/// ```
///
/// ## Thread Safety
///
/// - Each slot is a `OnceLock`, so concurrent writes to one slot cannot race
/// - Writers never touch each other's slots (no contention)
/// - Readers see either the written value or the default, never a torn value
#[derive(Debug)]
pub struct ResultStore<T> {
    slots: Vec<OnceLock<T>>,
}

/// Exclusive write access to one slot of a [`ResultStore`].
///
/// Consumed by [`write`](Self::write), so a single writer can only ever publish once.
#[derive(Debug)]
pub struct SlotWriter<'a, T> {
    store: &'a ResultStore<T>,
    index: usize,
}

impl<T> ResultStore<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> ResultStore<T>
where
    T: Default + Copy,
{
    /// Creates a store with `len` unwritten slots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cyclic_rendezvous::ResultStore;
    ///
    /// let store = ResultStore::<u64>::new(10);
    /// assert_eq!(store.len(), 10);
    /// assert_eq!(store.snapshot(), vec![0; 10]);
    /// ```
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Creates the writer for slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn build_slot_writer(&self, index: usize) -> SlotWriter<'_, T> {
        if index >= self.len() {
            panic!(
                "Slot index {} out of bounds (len: {})",
                index,
                self.len()
            );
        }

        SlotWriter { store: self, index }
    }

    /// Value of slot `index`, or `None` if it has not been written or does not exist.
    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.slots.get(index)?.get().copied()
    }

    /// Number of slots written so far.
    pub fn written(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Copies every slot, substituting `T::default()` for slots not written yet.
    ///
    /// This is what the barrier action reads. Called mid-cycle it counts exactly the partial
    /// results published so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.slots
            .iter()
            .map(|slot| slot.get().copied().unwrap_or_default())
            .collect()
    }

    /// Like [`snapshot`](Self::snapshot), also returning how many of the copied slots were
    /// written. Both come from the same pass, so a slot published concurrently is either in
    /// the values and the count or in neither.
    pub fn snapshot_counted(&self) -> (Vec<T>, usize) {
        let mut written = 0;
        let values = self
            .slots
            .iter()
            .map(|slot| match slot.get() {
                Some(value) => {
                    written += 1;
                    *value
                }
                None => T::default(),
            })
            .collect();

        (values, written)
    }
}

impl<T> SlotWriter<'_, T> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Publishes `value` into the slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SlotAlreadyWritten`] if another writer for the same index already
    /// published a value.
    pub fn write(self, value: T) -> Result<(), StoreError> {
        self.store.slots[self.index]
            .set(value)
            .map_err(|_| StoreError::SlotAlreadyWritten { index: self.index })
    }
}
