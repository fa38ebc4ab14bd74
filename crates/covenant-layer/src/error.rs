use covenant_ir::MethodId;

/// A fixpoint ran out of its iteration budget. The points still pending,
/// and everything reachable from them, were set to top; the results are
/// sound but imprecise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{layer} analysis of {method} did not converge within {budget} iterations; {forced} points widened to top"
)]
pub struct AnalysisDivergence {
    pub method: MethodId,
    pub layer: &'static str,
    pub budget: usize,
    pub forced: usize,
}
