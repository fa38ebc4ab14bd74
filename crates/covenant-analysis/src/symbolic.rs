use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use covenant_ir::{Apc, FieldId};
use covenant_layer::Slot;
use rustc_hash::FxHashMap;

static NEXT_KEY: AtomicU32 = AtomicU32::new(0);

/// An opaque value computed by the method, compared by key.
///
/// Keys come from one process-wide counter, so values of different methods
/// never collide.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolicValue(u32);

impl SymbolicValue {
    fn fresh() -> Self {
        SymbolicValue(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    pub fn key(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sv{}", self.0)
    }
}

/// What a symbolic value was created for at its program point.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub(crate) enum MemoKey {
    /// Content of a slot nothing had written yet, or the merge of
    /// disagreeing slot contents.
    Slot(Slot),
    /// Field content loaded before anything was known, or the merge of
    /// disagreeing field contents.
    Field(SymbolicValue, FieldId),
    /// Result of the operation at the point.
    Def,
    /// Exception object received by a catch handler.
    Exception,
}

/// Hands out symbolic values, one per `(point, key)`, so that revisiting a
/// point during a fixpoint yields the same values.
#[derive(Debug, Default)]
pub(crate) struct SymbolicFactory {
    memo: FxHashMap<(Apc, MemoKey), SymbolicValue>,
}

impl SymbolicFactory {
    pub(crate) fn value(&mut self, apc: &Apc, key: MemoKey) -> SymbolicValue {
        *self
            .memo
            .entry((apc.clone(), key))
            .or_insert_with(SymbolicValue::fresh)
    }

    /// Value already handed out for `(apc, key)`.
    pub(crate) fn existing(&self, apc: &Apc, key: MemoKey) -> Option<SymbolicValue> {
        self.memo.get(&(apc.clone(), key)).copied()
    }
}
