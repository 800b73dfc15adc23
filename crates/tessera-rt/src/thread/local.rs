use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::fatal;
use crate::symbol::Symbol;

/// Process-wide slot numbering. Indices released by a dropped store are
/// handed out again with a bumped generation, so per-thread storage stays as
/// long as the largest number of slots alive at once.
static SLOT_ALLOCATOR: Mutex<SlotAllocator> = parking_lot::const_mutex(SlotAllocator::new());

thread_local! {
    /// Per-OS-thread values, indexed by slot number and tagged with the
    /// generation of the slot that wrote them.
    static SLOTS: RefCell<Vec<Option<(u32, Box<dyn Any>)>>> = const { RefCell::new(Vec::new()) };
}

struct SlotAllocator {
    next: usize,
    free: Vec<SlotId>,
}

impl SlotAllocator {
    const fn new() -> Self {
        Self {
            next: 0,
            free: Vec::new(),
        }
    }

    fn allocate(&mut self) -> SlotId {
        if let Some(slot) = self.free.pop() {
            return slot;
        }
        let slot = SlotId {
            index: self.next,
            generation: 0,
        };
        self.next += 1;
        slot
    }

    fn release(&mut self, slot: SlotId) {
        self.free.push(SlotId {
            index: slot.index,
            generation: slot.generation.wrapping_add(1),
        });
    }
}

/// Stable handle of a thread-local slot.
///
/// Resolving a slot once with [`ThreadLocalStore::slot_for`] and then using
/// the `*_slot` accessors touches only the calling thread's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: usize,
    generation: u32,
}

impl SlotId {
    pub fn index(self) -> usize {
        self.index
    }
}

/// Maps identifiers to OS-thread-scoped storage slots holding a `T`.
///
/// Creating the slot for an identifier is shared across threads and happens
/// once, under a lock. Reading and writing a slot only touches the calling OS
/// thread's storage. Slots are released when the store is dropped.
pub struct ThreadLocalStore<T> {
    keys: Mutex<FxHashMap<Symbol, SlotId>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> ThreadLocalStore<T> {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(FxHashMap::default()),
            _marker: PhantomData,
        }
    }

    /// Returns the slot registered for `key`, creating it on first use.
    pub fn slot_for(&self, key: Symbol) -> SlotId {
        let mut keys = self.keys.lock();
        *keys.entry(key).or_insert_with(|| {
            let slot = SLOT_ALLOCATOR.lock().allocate();
            log::trace!("Created thread-local slot {} for {:?}", slot.index, key);
            slot
        })
    }

    /// The calling thread's value for `key`, if it ever set one.
    pub fn get(&self, key: Symbol) -> Option<T> {
        self.get_slot(self.slot_for(key))
    }

    /// Stores `value` in the calling thread's slot for `key`.
    ///
    /// Aborts the process if the slot cannot be written (for instance while
    /// the thread's storage is being torn down): callers, including the
    /// collector's current-thread lookup, rely on this never failing silently.
    pub fn set(&self, key: Symbol, value: T) {
        self.set_slot(self.slot_for(key), value)
    }

    /// Clears the calling thread's slot for `key`, returning the old value.
    pub fn take(&self, key: Symbol) -> Option<T> {
        self.take_slot(self.slot_for(key))
    }

    pub fn get_slot(&self, slot: SlotId) -> Option<T> {
        SLOTS
            .try_with(|slots| {
                let slots = slots.try_borrow().ok()?;
                match slots.get(slot.index)? {
                    Some((generation, value)) if *generation == slot.generation => {
                        (**value).downcast_ref::<T>().cloned()
                    }
                    _ => None,
                }
            })
            .ok()
            .flatten()
    }

    pub fn set_slot(&self, slot: SlotId, value: T) {
        let boxed: Box<dyn Any> = Box::new(value);
        if Self::replace(slot, Some((slot.generation, boxed))).is_err() {
            fatal!("could not set thread local storage");
        }
    }

    pub fn take_slot(&self, slot: SlotId) -> Option<T> {
        match Self::replace(slot, None) {
            Ok(Some((generation, boxed))) if generation == slot.generation => {
                boxed.downcast::<T>().ok().map(|value| *value)
            }
            _ => None,
        }
    }

    fn replace(
        slot: SlotId,
        value: Option<(u32, Box<dyn Any>)>,
    ) -> Result<Option<(u32, Box<dyn Any>)>, ()> {
        SLOTS
            .try_with(|slots| {
                let mut slots = slots.try_borrow_mut().map_err(|_| ())?;
                if slots.len() <= slot.index {
                    slots.resize_with(slot.index + 1, || None);
                }
                Ok(mem::replace(&mut slots[slot.index], value))
            })
            .map_err(|_| ())?
    }
}

impl<T: Clone + 'static> Default for ThreadLocalStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ThreadLocalStore<T> {
    fn drop(&mut self) {
        let keys = mem::take(self.keys.get_mut());
        let mut allocator = SLOT_ALLOCATOR.lock();
        for slot in keys.into_values() {
            allocator.release(slot);
        }
    }
}

impl<T> fmt::Debug for ThreadLocalStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalStore")
            .field("slots", &self.keys.lock().len())
            .finish()
    }
}
