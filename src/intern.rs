//! Symbol interning.
//!
//! Two independent pools exist: a case-insensitive default pool (`sym`, the
//! one the reader uses for ordinary identifiers) and a
//! case-sensitive pool (`symCase`, used internally — e.g. by the compiler
//! for synthetic names it must not collide with user identifiers under case
//! folding). Each pool maps a name to the single `Value` that canonically
//! represents it; interning the same name twice in the same pool returns
//! the same `Value`.
//!
//! A symbol's text lives directly in its `HeapData::Symbol` payload, so
//! there is no separate `SymbolId` indirection: the heap slot itself *is*
//! the symbol's identity. The maps here exist purely to make repeated
//! interning of the same name fast (a hash lookup instead of a linear scan
//! over every live symbol) and are purged of dead entries after a
//! collection so that re-interning a name whose previous `Value` was swept
//! allocates fresh rather than resolving to a stale, now-invalid slot.

use ahash::AHashMap;

use crate::heap::{Heap, HeapData, Value};

#[derive(Default)]
pub(crate) struct Interner {
    case_insensitive: AHashMap<Box<str>, Value>,
    case_sensitive: AHashMap<Box<str>, Value>,
}

impl Interner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn intern_ci(&mut self, heap: &mut Heap, name: &str) -> Value {
        let key = name.to_ascii_lowercase().into_boxed_str();
        if let Some(&v) = self.case_insensitive.get(&key) {
            return v;
        }
        let v = heap.alloc(HeapData::Symbol(name.into()));
        self.case_insensitive.insert(key, v);
        v
    }

    pub(crate) fn intern_cs(&mut self, heap: &mut Heap, name: &str) -> Value {
        if let Some(&v) = self.case_sensitive.get(name) {
            return v;
        }
        let v = heap.alloc(HeapData::Symbol(name.into()));
        self.case_sensitive.insert(name.into(), v);
        v
    }

    /// Drops entries whose `Value` was collected by the last sweep, so a
    /// future `intern_*` call for that name allocates a new symbol instead
    /// of resolving to a dead slot.
    pub(crate) fn retain_live(&mut self, heap: &Heap) {
        self.case_insensitive.retain(|_, v| heap.is_live(*v));
        self.case_sensitive.retain(|_, v| heap.is_live(*v));
    }
}
