use bon::Builder;
use covenant_analysis::DEFAULT_MAX_BACKWARD_DEPTH;
use covenant_layer::{DEFAULT_MAX_ITERATIONS, WideningStrategy};

/// Knobs shared by every method analyzed in a run.
///
/// ```
/// use covenant_driver::AnalysisConfig;
///
/// let config = AnalysisConfig::builder().max_iterations(50).debug(true).build();
/// assert_eq!(config.max_backward_depth, 400);
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Worklist steps per fixpoint before the remaining points are widened
    /// to top.
    #[builder(default = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,
    #[builder(default)]
    pub widening: WideningStrategy,
    /// Blocks a backward walk of precondition inference may visit.
    #[builder(default = DEFAULT_MAX_BACKWARD_DEPTH)]
    pub max_backward_depth: usize,
    /// Log every analyzed layer with its facts at `debug` level.
    #[builder(default)]
    pub debug: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
