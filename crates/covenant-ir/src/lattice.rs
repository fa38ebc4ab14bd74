use std::fmt;

pub trait Lattice {
    fn join(&self, other: &Self) -> Self;
    fn meet(&self, other: &Self) -> Self;
    fn is_subseteq(&self, other: &Self) -> bool;
}

pub trait HasBottom: Lattice {
    fn bottom() -> Self;
}

pub trait HasTop: Lattice {
    fn top() -> Self;
}

/// A lattice with both extremes and no infinite ascending chains.
pub trait FiniteLattice: HasBottom + HasTop {}

impl<L: HasBottom + HasTop> FiniteLattice for L {}

/// Four-valued answer to a static predicate query.
///
/// `Bottom` means the queried point is dead code, which is different from
/// `Top` (the analysis could not decide).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ProofOutcome {
    Top,
    True,
    False,
    Bottom,
}

impl ProofOutcome {
    pub fn from_bool(value: bool) -> Self {
        if value {
            ProofOutcome::True
        } else {
            ProofOutcome::False
        }
    }

    pub fn negate(self) -> Self {
        match self {
            ProofOutcome::True => ProofOutcome::False,
            ProofOutcome::False => ProofOutcome::True,
            other => other,
        }
    }

    pub fn is_true(self) -> bool {
        self == ProofOutcome::True
    }
}

impl Lattice for ProofOutcome {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ProofOutcome::Bottom, x) | (x, ProofOutcome::Bottom) => *x,
            (a, b) if a == b => *a,
            _ => ProofOutcome::Top,
        }
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (ProofOutcome::Top, x) | (x, ProofOutcome::Top) => *x,
            (a, b) if a == b => *a,
            _ => ProofOutcome::Bottom,
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (ProofOutcome::Bottom, _) | (_, ProofOutcome::Top)
        ) || self == other
    }
}

impl HasBottom for ProofOutcome {
    fn bottom() -> Self {
        ProofOutcome::Bottom
    }
}

impl HasTop for ProofOutcome {
    fn top() -> Self {
        ProofOutcome::Top
    }
}

impl fmt::Display for ProofOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProofOutcome::Top => "top",
            ProofOutcome::True => "true",
            ProofOutcome::False => "false",
            ProofOutcome::Bottom => "bottom",
        };
        f.write_str(text)
    }
}
