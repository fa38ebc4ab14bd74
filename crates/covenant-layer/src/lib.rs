//! Code layers: decoders that replay a method body as [`Operation`]s over
//! progressively richer variables, and the forward fixpoint engine that
//! runs analyses over them.
//!
//! The chain starts at [`RawDecoder`] (implicit stack), goes through
//! [`StackDecoder`] (explicit [`Slot`]s) and [`ContractFreeView`] (contract
//! calls elided), and is continued by the analysis-backed decoders of
//! `covenant-analysis`. Every decoder is wrapped in a [`CodeLayer`] that
//! carries the method context and is the only way to start a fixpoint.

mod contract_free;
mod decoder;
mod error;
mod fixpoint;
mod layer;
mod operation;
mod printer;
mod raw;
mod stack;
mod value;
mod widening;

pub use contract_free::ContractFreeView;
pub use decoder::Decoder;
pub use error::AnalysisDivergence;
pub use fixpoint::{DEFAULT_MAX_ITERATIONS, FixpointResult, FixpointRunner, ForwardAnalysis};
pub use layer::{CodeLayer, MethodContext};
pub use operation::{Access, Args, Operation};
pub use printer::PrintConfig;
pub use raw::{RawDecoder, Source};
pub use stack::{Slot, StackDecoder};
pub use value::AbstractValue;
pub use widening::WideningStrategy;
