use std::fmt;

use covenant_ir::{HasBottom, HasTop, Lattice, ProofOutcome};
use covenant_layer::AbstractValue;

/// Whether a reference may be null.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub enum Nullness {
    Bottom,
    Null,
    NonNull,
    #[default]
    Top,
}

impl Nullness {
    /// Answer to "is this value null?".
    pub fn is_null(self) -> ProofOutcome {
        match self {
            Nullness::Bottom => ProofOutcome::Bottom,
            Nullness::Null => ProofOutcome::True,
            Nullness::NonNull => ProofOutcome::False,
            Nullness::Top => ProofOutcome::Top,
        }
    }

    pub fn is_non_null(self) -> ProofOutcome {
        self.is_null().negate()
    }
}

impl Lattice for Nullness {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Nullness::Bottom, x) | (x, Nullness::Bottom) => *x,
            (a, b) if a == b => *a,
            _ => Nullness::Top,
        }
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Nullness::Top, x) | (x, Nullness::Top) => *x,
            (a, b) if a == b => *a,
            _ => Nullness::Bottom,
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        matches!((self, other), (Nullness::Bottom, _) | (_, Nullness::Top)) || self == other
    }
}

impl HasBottom for Nullness {
    fn bottom() -> Self {
        Nullness::Bottom
    }
}

impl HasTop for Nullness {
    fn top() -> Self {
        Nullness::Top
    }
}

impl AbstractValue for Nullness {
    fn widen(&self, next: &Self) -> Self {
        self.join(next)
    }
}

impl fmt::Display for Nullness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Nullness::Bottom => "bottom",
            Nullness::Null => "null",
            Nullness::NonNull => "non-null",
            Nullness::Top => "maybe-null",
        };
        f.write_str(text)
    }
}
