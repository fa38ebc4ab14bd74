use crate::{MethodId, Offset};

/// Malformed method body: the method cannot be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("metadata provider has no body for method {0}")]
    MissingBody(MethodId),
    #[error("method body is empty")]
    EmptyBody,
    #[error("branch at {offset} targets {target}, outside the method body")]
    BranchOutOfRange { offset: Offset, target: Offset },
    #[error("control falls off the end of the method body at {offset}")]
    FallsOffEnd { offset: Offset },
    #[error("exception region {region} is not properly nested or out of bounds")]
    UnbalancedRegion { region: usize },
    #[error("stack height mismatch at {offset}: expected {expected}, found {found}")]
    StackHeightMismatch {
        offset: Offset,
        expected: usize,
        found: usize,
    },
    #[error("stack underflow at {offset}")]
    StackUnderflow { offset: Offset },
    #[error("stack grows past its maximum height at {offset}")]
    StackOverflow { offset: Offset },
}

/// The contract provider could not resolve a reference. Analysis proceeds
/// as if the method had no contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve contracts of {method}: {reason}")]
pub struct ContractResolutionError {
    pub method: MethodId,
    pub reason: String,
}
