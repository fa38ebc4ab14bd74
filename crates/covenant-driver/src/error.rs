use covenant_ir::{BuildError, ContractResolutionError, MethodId};
use covenant_layer::AnalysisDivergence;

/// What went wrong while analyzing one method.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MethodErrorKind {
    /// The method was skipped.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The results are sound but imprecise.
    #[error(transparent)]
    Divergence(#[from] AnalysisDivergence),
    /// The method was analyzed as if it had no contract.
    #[error(transparent)]
    Contract(#[from] ContractResolutionError),
}

/// An error tagged with the method it happened in.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{method}: {kind}")]
pub struct MethodError {
    pub method: MethodId,
    pub kind: MethodErrorKind,
}

impl MethodError {
    pub fn new(method: MethodId, kind: impl Into<MethodErrorKind>) -> Self {
        Self {
            method,
            kind: kind.into(),
        }
    }

    /// Whether the method could not be analyzed at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, MethodErrorKind::Build(_))
    }
}
