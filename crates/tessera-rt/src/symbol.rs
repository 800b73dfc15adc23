use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Name under which [`Symbol::CURRENT_THREAD`] is pre-interned.
pub const CURRENT_THREAD_NAME: &str = "__current_thread";

/// An interned identifier. Opaque, hashable and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Reserved key of the "current managed thread" thread-local slot.
    pub const CURRENT_THREAD: Symbol = Symbol(0);

    pub const fn new(id: u32) -> Self {
        Symbol(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Default)]
struct SymbolTableInner {
    names: Vec<Box<str>>,
    ids: FxHashMap<Box<str>, Symbol>,
}

/// Interns names into [`Symbol`]s. Shared by every thread of a runtime.
#[derive(Debug)]
pub struct SymbolTable {
    inner: Mutex<SymbolTableInner>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let table = Self {
            inner: Mutex::new(SymbolTableInner::default()),
        };
        let current = table.intern(CURRENT_THREAD_NAME);
        debug_assert_eq!(current, Symbol::CURRENT_THREAD);
        table
    }

    /// Returns the symbol for `name`, allocating a new one on first use.
    pub fn intern(&self, name: &str) -> Symbol {
        let mut inner = self.inner.lock();
        if let Some(symbol) = inner.ids.get(name) {
            return *symbol;
        }
        let symbol = Symbol(inner.names.len() as u32);
        inner.names.push(name.into());
        inner.ids.insert(name.into(), symbol);
        symbol
    }

    /// Returns the name a symbol was interned from.
    pub fn name(&self, symbol: Symbol) -> Option<String> {
        self.inner
            .lock()
            .names
            .get(symbol.0 as usize)
            .map(|name| name.to_string())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_thread_is_pre_interned() {
        let table = SymbolTable::new();
        assert_eq!(table.intern(CURRENT_THREAD_NAME), Symbol::CURRENT_THREAD);
        assert_eq!(table.name(Symbol::CURRENT_THREAD).as_deref(), Some(CURRENT_THREAD_NAME));
    }

    #[test]
    fn interning_is_stable() {
        let table = SymbolTable::new();
        let a = table.intern("request_id");
        let b = table.intern("locale");
        assert_ne!(a, b);
        assert_eq!(table.intern("request_id"), a);
        assert_eq!(table.len(), 3);
        assert_eq!(table.name(Symbol::new(99)), None);
    }
}
