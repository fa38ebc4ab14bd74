use std::sync::Arc;

use covenant_ir::{Apc, BoxedExpression, ProofOutcome};
use covenant_layer::Slot;

use crate::expression::Expander;
use crate::{HeapDecoder, Predicate, SymbolicValue, ValueState, Values};

/// Read-only queries over the heap and value fixpoints of one method.
///
/// Points no analysis reached answer `Bottom` to every predicate.
#[derive(Clone, Debug)]
pub struct FactBase {
    heap: Arc<HeapDecoder>,
    values: Arc<Values>,
}

impl FactBase {
    pub fn new(heap: Arc<HeapDecoder>, values: Arc<Values>) -> Self {
        Self { heap, values }
    }

    pub fn is_unreachable(&self, apc: &Apc) -> bool {
        self.heap.is_unreachable(apc) || self.values.is_unreachable(apc)
    }

    pub fn is_null(&self, apc: &Apc, v: SymbolicValue) -> ProofOutcome {
        if self.is_unreachable(apc) {
            return ProofOutcome::Bottom;
        }
        self.values.is_null(apc, v)
    }

    pub fn is_non_null(&self, apc: &Apc, v: SymbolicValue) -> ProofOutcome {
        if self.is_unreachable(apc) {
            return ProofOutcome::Bottom;
        }
        self.values.is_non_null(apc, v)
    }

    pub fn is_true(&self, apc: &Apc, predicate: &Predicate) -> ProofOutcome {
        if self.is_unreachable(apc) {
            return ProofOutcome::Bottom;
        }
        self.values.is_true(apc, predicate)
    }

    /// Symbolic value held by `slot` before the operation at `apc`.
    pub fn value_of(&self, apc: &Apc, slot: Slot) -> Option<SymbolicValue> {
        self.heap.value_at(apc, slot)
    }

    /// Source-level expression for `v` at `apc`.
    pub fn expression(&self, apc: &Apc, v: SymbolicValue) -> Option<BoxedExpression> {
        let ValueState::Reached(facts) = self.values.state(apc)? else {
            return None;
        };
        Expander::new(&self.values, &facts).expand(v)
    }

    pub fn heap(&self) -> &Arc<HeapDecoder> {
        &self.heap
    }

    pub fn values(&self) -> &Arc<Values> {
        &self.values
    }
}
