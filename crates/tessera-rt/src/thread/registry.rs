use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::object::{ThreadId, ThreadInner, ThreadObject};

/// The set of every live [`ThreadObject`] of a runtime.
///
/// Entries are added once an object's OS thread and stack are known and removed when its last
/// handle is dropped. The registry does not keep objects alive; it holds weak
/// references and hands out a snapshot of strong ones for enumeration, so the
/// lock is never held while visitors run or while an object is dropped.
pub struct ThreadRegistry {
    threads: Mutex<FxHashMap<ThreadId, Weak<ThreadInner>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn add(&self, thread: &Arc<ThreadInner>) {
        let previous = self.threads.lock().insert(thread.id(), Arc::downgrade(thread));
        debug_assert!(previous.is_none(), "thread {:?} registered twice", thread.id());
        log::trace!("Registered thread {:?}", thread.id());
    }

    pub(crate) fn remove(&self, id: ThreadId) {
        let removed = self.threads.lock().remove(&id);
        debug_assert!(removed.is_some(), "thread {:?} was not registered", id);
        log::trace!("Unregistered thread {:?}", id);
    }

    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.lock().contains_key(&id)
    }

    /// Strong handles to every thread registered right now. Objects whose last
    /// handle is being dropped concurrently are skipped.
    pub fn snapshot(&self) -> Vec<ThreadObject> {
        self.threads
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .map(ThreadObject::from_inner)
            .collect()
    }

    /// Visits every live thread, in no particular order.
    pub fn for_each(&self, mut visitor: impl FnMut(&ThreadObject)) {
        for thread in self.snapshot() {
            visitor(&thread);
        }
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("live", &self.len())
            .finish()
    }
}
