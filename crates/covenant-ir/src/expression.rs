use std::fmt;

use crate::{BinaryOp, CmpOp, UnaryOp};

/// Source-level expression tree used for contract clauses, both the ones
/// read from the contract provider and the ones inferred by the analysis.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum BoxedExpression {
    /// A parameter (or `this`) by name.
    Variable(String),
    /// The method's return value.
    Result,
    Null,
    Constant(i64),
    Field(Box<BoxedExpression>, String),
    Unary(UnaryOp, Box<BoxedExpression>),
    Binary(BinaryOp, Box<BoxedExpression>, Box<BoxedExpression>),
    Compare(CmpOp, Box<BoxedExpression>, Box<BoxedExpression>),
}

impl BoxedExpression {
    pub fn variable(name: impl Into<String>) -> Self {
        BoxedExpression::Variable(name.into())
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        BoxedExpression::Field(Box::new(self), name.into())
    }

    pub fn compare(op: CmpOp, left: BoxedExpression, right: BoxedExpression) -> Self {
        BoxedExpression::Compare(op, Box::new(left), Box::new(right))
    }

    pub fn not_null(self) -> Self {
        Self::compare(CmpOp::Ne, self, BoxedExpression::Null)
    }

    pub fn is_null(self) -> Self {
        Self::compare(CmpOp::Eq, self, BoxedExpression::Null)
    }

    /// If this is `e != null` or `e == null` where `e` is a plain variable
    /// or the return value, return `e` and whether it asserts non-nullness.
    pub fn as_null_check(&self) -> Option<(&BoxedExpression, bool)> {
        let BoxedExpression::Compare(op, left, right) = self else {
            return None;
        };
        let checked = match (left.as_ref(), right.as_ref()) {
            (e, BoxedExpression::Null) | (BoxedExpression::Null, e) => e,
            _ => return None,
        };
        if !matches!(checked, BoxedExpression::Variable(_) | BoxedExpression::Result) {
            return None;
        }
        match op {
            CmpOp::Ne => Some((checked, true)),
            CmpOp::Eq => Some((checked, false)),
            _ => None,
        }
    }
}

impl fmt::Display for BoxedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoxedExpression::Variable(name) => f.write_str(name),
            BoxedExpression::Result => f.write_str("result"),
            BoxedExpression::Null => f.write_str("null"),
            BoxedExpression::Constant(c) => write!(f, "{c}"),
            BoxedExpression::Field(base, name) => write!(f, "{base}.{name}"),
            BoxedExpression::Unary(op, e) => write!(f, "{}({e})", op.symbol()),
            BoxedExpression::Binary(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            BoxedExpression::Compare(op, l, r) => write!(f, "{l} {} {r}", op.symbol()),
        }
    }
}
