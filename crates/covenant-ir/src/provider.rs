use crate::{BoxedExpression, ContractResolutionError, FieldDef, FieldId, MethodDef, MethodId, TypeId};

/// Read access to method bodies and signatures.
///
/// Providers are shared by every method analyzed in a run, possibly from
/// several threads, so they must be safe for concurrent reads.
pub trait MetadataProvider: Send + Sync {
    fn method(&self, method: MethodId) -> Option<&MethodDef>;

    fn field(&self, field: FieldId) -> Option<&FieldDef>;

    fn type_name(&self, ty: TypeId) -> Option<&str>;

    fn method_name(&self, method: MethodId) -> String {
        self.method(method)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| method.to_string())
    }

    fn field_name(&self, field: FieldId) -> String {
        self.field(field)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| field.to_string())
    }
}

/// Calls into the contract library recognized by a [`ContractProvider`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ContractKind {
    Requires,
    Ensures,
    Invariant,
    Assert,
    Assume,
    EndContractBlock,
    /// `Result<T>()` inside a postcondition.
    Result,
    /// `OldValue(x)` inside a postcondition.
    OldValue,
}

impl ContractKind {
    /// Whether a call of this kind only checks a condition and can be
    /// dropped without changing what the method computes.
    pub fn is_assertion(self) -> bool {
        !matches!(self, ContractKind::Result | ContractKind::OldValue)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ClauseKind {
    Requires,
    Ensures,
    Invariant,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContractClause {
    pub kind: ClauseKind,
    pub condition: BoxedExpression,
}

impl ContractClause {
    pub fn requires(condition: BoxedExpression) -> Self {
        Self {
            kind: ClauseKind::Requires,
            condition,
        }
    }

    pub fn ensures(condition: BoxedExpression) -> Self {
        Self {
            kind: ClauseKind::Ensures,
            condition,
        }
    }
}

/// Recognizes contract call sites and serves the clauses attached to a
/// method.
pub trait ContractProvider: Send + Sync {
    fn contract_kind(&self, callee: MethodId) -> Option<ContractKind>;

    fn clauses(&self, method: MethodId) -> Result<Vec<ContractClause>, ContractResolutionError>;
}
