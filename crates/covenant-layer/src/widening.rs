use crate::AbstractValue;

/// When a fixpoint runner widens instead of joining at a loop head. Other
/// merge points always join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideningStrategy {
    /// Widen on every revisit.
    AllJoins,
    /// Only join. Suitable for finite-height lattices, which terminate
    /// without widening.
    Never,
    /// Join for the first `n` revisits of each point, then widen.
    Delayed(usize),
}

impl Default for WideningStrategy {
    fn default() -> Self {
        WideningStrategy::Delayed(3)
    }
}

impl WideningStrategy {
    /// Whether the `visit_count`-th revisit of a point should widen.
    pub fn should_widen(&self, visit_count: usize) -> bool {
        match self {
            Self::AllJoins => true,
            Self::Never => false,
            Self::Delayed(n) => visit_count > *n,
        }
    }

    /// Merge `current` with `incoming` according to this strategy.
    ///
    /// `visit_count` is the number of times the target point has been
    /// revisited (excluding the first visit).
    pub fn merge<V: AbstractValue>(&self, current: &V, incoming: &V, visit_count: usize) -> V {
        if self.should_widen(visit_count) {
            current.widen(incoming)
        } else {
            current.join(incoming)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delayed_widens_after_n_revisits() {
        let s = WideningStrategy::Delayed(2);
        assert!(!s.should_widen(1));
        assert!(!s.should_widen(2));
        assert!(s.should_widen(3));
        assert!(WideningStrategy::AllJoins.should_widen(1));
        assert!(!WideningStrategy::Never.should_widen(1000));
    }
}
