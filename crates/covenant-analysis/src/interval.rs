use std::fmt;

use covenant_ir::{BinaryOp, CmpOp, HasBottom, HasTop, Lattice, ProofOutcome};
use covenant_layer::AbstractValue;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, b) | (b, Bound::PosInf) => b,
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.min(b)),
        }
    }

    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
            (Bound::NegInf, b) | (b, Bound::NegInf) => b,
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a.max(b)),
        }
    }

    pub fn less_than(self, other: Self) -> bool {
        match (self, other) {
            (Bound::NegInf, Bound::NegInf) | (Bound::PosInf, _) | (_, Bound::NegInf) => false,
            (Bound::NegInf, _) | (_, Bound::PosInf) => true,
            (Bound::Finite(a), Bound::Finite(b)) => a < b,
        }
    }

    pub fn less_eq(self, other: Self) -> bool {
        self == other || self.less_than(other)
    }

    // Arithmetic on bounds answers `None` when a finite result overflows.
    // Machine arithmetic wraps, so the interval is then unknown.

    fn add(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Bound::NegInf, _) | (_, Bound::NegInf) => Some(Bound::NegInf),
            (Bound::PosInf, _) | (_, Bound::PosInf) => Some(Bound::PosInf),
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_add(b).map(Bound::Finite),
        }
    }

    fn sub(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Bound::NegInf, _) | (_, Bound::PosInf) => Some(Bound::NegInf),
            (Bound::PosInf, _) | (_, Bound::NegInf) => Some(Bound::PosInf),
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_sub(b).map(Bound::Finite),
        }
    }

    fn mul(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Some(Bound::Finite(0)),
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_mul(b).map(Bound::Finite),
            (a, b) => {
                if a.is_negative() == b.is_negative() {
                    Some(Bound::PosInf)
                } else {
                    Some(Bound::NegInf)
                }
            }
        }
    }

    fn is_negative(self) -> bool {
        match self {
            Bound::NegInf => true,
            Bound::Finite(v) => v < 0,
            Bound::PosInf => false,
        }
    }

    fn negate(self) -> Option<Self> {
        match self {
            Bound::NegInf => Some(Bound::PosInf),
            Bound::PosInf => Some(Bound::NegInf),
            Bound::Finite(v) => v.checked_neg().map(Bound::Finite),
        }
    }

    /// The next bound up; infinities stay put.
    fn succ(self) -> Self {
        match self {
            Bound::Finite(v) => Bound::Finite(v.saturating_add(1)),
            other => other,
        }
    }

    fn pred(self) -> Self {
        match self {
            Bound::Finite(v) => Bound::Finite(v.saturating_sub(1)),
            other => other,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-inf"),
            Bound::Finite(v) => write!(f, "{v}"),
            Bound::PosInf => write!(f, "+inf"),
        }
    }
}

/// A range `[lo, hi]` of integer values. Any interval with `lo > hi` is
/// empty, which is the bottom element.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Interval {
    pub lo: Bound,
    pub hi: Bound,
}

impl Interval {
    pub fn new(lo: i64, hi: i64) -> Self {
        if lo > hi {
            Self::bottom()
        } else {
            Self::bounded(Bound::Finite(lo), Bound::Finite(hi))
        }
    }

    pub fn constant(v: i64) -> Self {
        Self::new(v, v)
    }

    fn bounded(lo: Bound, hi: Bound) -> Self {
        let interval = Interval { lo, hi };
        if interval.is_empty() {
            Self::bottom()
        } else {
            interval
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.lo.less_eq(self.hi) || self.lo == Bound::PosInf || self.hi == Bound::NegInf
    }

    /// The single value this interval contains, if any.
    pub fn as_constant(&self) -> Option<i64> {
        match (self.lo, self.hi) {
            (Bound::Finite(lo), Bound::Finite(hi)) if lo == hi => Some(lo),
            _ => None,
        }
    }

    pub fn contains(&self, v: i64) -> bool {
        self.lo.less_eq(Bound::Finite(v)) && Bound::Finite(v).less_eq(self.hi)
    }

    pub fn binary(&self, op: BinaryOp, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::bottom();
        }
        let bounds = match op {
            BinaryOp::Add => self.lo.add(other.lo).zip(self.hi.add(other.hi)),
            BinaryOp::Sub => self.lo.sub(other.hi).zip(self.hi.sub(other.lo)),
            BinaryOp::Mul => {
                let products: Option<Vec<Bound>> = [
                    self.lo.mul(other.lo),
                    self.lo.mul(other.hi),
                    self.hi.mul(other.lo),
                    self.hi.mul(other.hi),
                ]
                .into_iter()
                .collect();
                products.map(|products| {
                    let lo = products.iter().copied().fold(Bound::PosInf, Bound::min);
                    let hi = products.iter().copied().fold(Bound::NegInf, Bound::max);
                    (lo, hi)
                })
            }
            _ => {
                return match (self.as_constant(), other.as_constant()) {
                    (Some(a), Some(b)) => {
                        fold_constant(op, a, b).map_or_else(Self::top, Self::constant)
                    }
                    _ => Self::top(),
                };
            }
        };
        bounds.map_or_else(Self::top, |(lo, hi)| Self::bounded(lo, hi))
    }

    pub fn negate(&self) -> Self {
        if self.is_empty() {
            return Self::bottom();
        }
        match self.hi.negate().zip(self.lo.negate()) {
            Some((lo, hi)) => Self::bounded(lo, hi),
            None => Self::top(),
        }
    }

    /// Whether `self op other` holds for every pair of members (`True`), for
    /// none (`False`), or `Bottom` when either side is empty.
    pub fn compare(&self, op: CmpOp, other: &Self) -> ProofOutcome {
        if self.is_empty() || other.is_empty() {
            return ProofOutcome::Bottom;
        }
        let always_lt = self.hi.less_than(other.lo);
        let always_le = self.hi.less_eq(other.lo);
        let always_gt = other.hi.less_than(self.lo);
        let always_ge = other.hi.less_eq(self.lo);
        let decided = match op {
            CmpOp::Lt => (always_lt, always_ge),
            CmpOp::Le => (always_le, always_gt),
            CmpOp::Gt => (always_gt, always_le),
            CmpOp::Ge => (always_ge, always_lt),
            CmpOp::Eq | CmpOp::Ne => {
                let same_constant =
                    self.as_constant().is_some() && self.as_constant() == other.as_constant();
                let disjoint = always_lt || always_gt;
                if op == CmpOp::Eq {
                    (same_constant, disjoint)
                } else {
                    (disjoint, same_constant)
                }
            }
        };
        match decided {
            (true, _) => ProofOutcome::True,
            (_, true) => ProofOutcome::False,
            _ => ProofOutcome::Top,
        }
    }

    /// Restrict `self` to the members `x` with `x op other` for some member
    /// of `other`.
    pub fn assume(&self, op: CmpOp, other: &Self) -> Self {
        if other.is_empty() {
            return Self::bottom();
        }
        let range = match op {
            CmpOp::Eq => *other,
            CmpOp::Lt => Self::bounded(Bound::NegInf, other.hi.pred()),
            CmpOp::Le => Self::bounded(Bound::NegInf, other.hi),
            CmpOp::Gt => Self::bounded(other.lo.succ(), Bound::PosInf),
            CmpOp::Ge => Self::bounded(other.lo, Bound::PosInf),
            CmpOp::Ne => return self.exclude(other),
        };
        self.meet(&range)
    }

    /// Drop a constant `other` from either end of `self`.
    fn exclude(&self, other: &Self) -> Self {
        let Some(c) = other.as_constant() else {
            return *self;
        };
        let c = Bound::Finite(c);
        match (self.lo == c, self.hi == c) {
            (true, true) => Self::bottom(),
            (true, false) => Self::bounded(c.succ(), self.hi),
            (false, true) => Self::bounded(self.lo, c.pred()),
            (false, false) => *self,
        }
    }
}

fn fold_constant(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::And => Some(a & b),
        BinaryOp::Or => Some(a | b),
        BinaryOp::Xor => Some(a ^ b),
    }
}

impl Lattice for Interval {
    fn join(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    fn meet(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::bottom();
        }
        Self::bounded(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        if self.is_empty() {
            return true;
        }
        if other.is_empty() {
            return false;
        }
        other.lo.less_eq(self.lo) && self.hi.less_eq(other.hi)
    }
}

impl HasBottom for Interval {
    fn bottom() -> Self {
        Interval {
            lo: Bound::PosInf,
            hi: Bound::NegInf,
        }
    }
}

impl HasTop for Interval {
    fn top() -> Self {
        Interval {
            lo: Bound::NegInf,
            hi: Bound::PosInf,
        }
    }
}

impl AbstractValue for Interval {
    fn widen(&self, next: &Self) -> Self {
        if self.is_empty() {
            return *next;
        }
        if next.is_empty() {
            return *self;
        }
        let lo = if next.lo.less_than(self.lo) {
            Bound::NegInf
        } else {
            self.lo
        };
        let hi = if self.hi.less_than(next.hi) {
            Bound::PosInf
        } else {
            self.hi
        };
        Interval { lo, hi }
    }

    fn narrow(&self, next: &Self) -> Self {
        if self.is_empty() || next.is_empty() {
            return *self;
        }
        let lo = match self.lo {
            Bound::NegInf => next.lo,
            other => other,
        };
        let hi = match self.hi {
            Bound::PosInf => next.hi,
            other => other,
        };
        Interval { lo, hi }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "[{}, {}]", self.lo, self.hi)
        }
    }
}
