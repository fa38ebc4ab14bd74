//! Heap and value analyses over the contract-free stack layer, the layers
//! they expose, and the contracts inferred from their results.
//!
//! [`HeapDecoder::analyze`] names every slot with a [`SymbolicValue`] and
//! yields the value layer. [`Values::analyze`] runs over that layer and
//! tracks nullness, ranges and comparisons per point. [`FactBase`] answers
//! queries over both, and [`ContractInference`] turns them into clauses.

mod expression;
mod facts;
mod heap;
mod inference;
mod interval;
mod nullness;
mod symbolic;
mod value;

pub use expression::{ExpressionDecoder, HybridDecoder, LabeledSymbol};
pub use facts::FactBase;
pub use heap::{HeapAnalysis, HeapDecoder, HeapFacts, HeapState, Renaming};
pub use inference::{ContractInference, DEFAULT_MAX_BACKWARD_DEPTH};
pub use interval::{Bound, Interval};
pub use nullness::Nullness;
pub use symbolic::SymbolicValue;
pub use value::{
    Operand, Predicate, Relation, SymExpr, ValueAnalysis, ValueFacts, ValueInfo, ValueState,
    Values,
};

#[cfg(test)]
mod tests;
