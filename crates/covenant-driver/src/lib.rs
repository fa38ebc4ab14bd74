//! Orchestration of a contract-analysis run.
//!
//! A [`BasicAnalysisDriver`] holds what every method of a run shares. An
//! [`AnalysisDriver`] turns it into one method driver per method, runs the
//! analysis it stands for, and collects the outcomes in a [`BatchReport`].
//! Methods that cannot be analyzed are skipped without stopping the batch.

mod config;
mod driver;
mod error;
mod inference;
mod method;

pub use config::AnalysisConfig;
pub use driver::{AnalysisDriver, BasicAnalysisDriver, BatchReport, MethodOutcome};
pub use error::{MethodError, MethodErrorKind};
pub use inference::{InferenceDriver, InferenceMethodDriver, InferredContracts};
pub use method::{
    AnalysisLayers, BasicMethodDriver, ContractFreeLayer, ExpressionLayer, HybridLayer,
    MethodDriver, RawLayer, StackLayer, ValueLayer,
};

#[cfg(test)]
mod tests;
