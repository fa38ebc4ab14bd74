use covenant_ir::{
    ContractClause, ContractKind, ContractProvider, ContractResolutionError, FieldDef, FieldId,
    MetadataProvider, MethodDef, MethodId, TypeId,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Method ids reserved for the contract library recognized by
/// [`InMemoryContracts::standard`].
pub mod contract_library {
    use covenant_ir::MethodId;

    pub const REQUIRES: MethodId = MethodId::new(1000);
    pub const ENSURES: MethodId = MethodId::new(1001);
    pub const INVARIANT: MethodId = MethodId::new(1002);
    pub const ASSERT: MethodId = MethodId::new(1003);
    pub const ASSUME: MethodId = MethodId::new(1004);
    pub const END_CONTRACT_BLOCK: MethodId = MethodId::new(1005);
    pub const RESULT: MethodId = MethodId::new(1006);
}

/// Metadata served from hash maps filled by the test.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadata {
    methods: FxHashMap<MethodId, MethodDef>,
    fields: FxHashMap<FieldId, FieldDef>,
    types: FxHashMap<TypeId, String>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, id: MethodId, def: MethodDef) -> Self {
        self.methods.insert(id, def);
        self
    }

    pub fn with_field(mut self, id: FieldId, name: &str, declaring_type: TypeId) -> Self {
        self.fields.insert(
            id,
            FieldDef {
                name: name.to_string(),
                declaring_type,
            },
        );
        self
    }

    pub fn with_type(mut self, id: TypeId, name: &str) -> Self {
        self.types.insert(id, name.to_string());
        self
    }

    /// Ids of every method with a body, in ascending order.
    pub fn methods_with_bodies(&self) -> Vec<MethodId> {
        let mut ids: Vec<_> = self
            .methods
            .iter()
            .filter(|(_, def)| def.body.is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn method(&self, method: MethodId) -> Option<&MethodDef> {
        self.methods.get(&method)
    }

    fn field(&self, field: FieldId) -> Option<&FieldDef> {
        self.fields.get(&field)
    }

    fn type_name(&self, ty: TypeId) -> Option<&str> {
        self.types.get(&ty).map(String::as_str)
    }
}

/// Contract provider backed by hash maps filled by the test.
#[derive(Clone, Debug, Default)]
pub struct InMemoryContracts {
    kinds: FxHashMap<MethodId, ContractKind>,
    clauses: FxHashMap<MethodId, Vec<ContractClause>>,
    unresolvable: FxHashSet<MethodId>,
}

impl InMemoryContracts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider recognizing the ids in [`contract_library`].
    pub fn standard() -> Self {
        use contract_library::*;
        Self::new()
            .with_contract_method(REQUIRES, ContractKind::Requires)
            .with_contract_method(ENSURES, ContractKind::Ensures)
            .with_contract_method(INVARIANT, ContractKind::Invariant)
            .with_contract_method(ASSERT, ContractKind::Assert)
            .with_contract_method(ASSUME, ContractKind::Assume)
            .with_contract_method(END_CONTRACT_BLOCK, ContractKind::EndContractBlock)
            .with_contract_method(RESULT, ContractKind::Result)
    }

    pub fn with_contract_method(mut self, callee: MethodId, kind: ContractKind) -> Self {
        self.kinds.insert(callee, kind);
        self
    }

    pub fn with_clause(mut self, method: MethodId, clause: ContractClause) -> Self {
        self.clauses.entry(method).or_default().push(clause);
        self
    }

    /// Make [`ContractProvider::clauses`] fail for `method`.
    pub fn with_unresolvable(mut self, method: MethodId) -> Self {
        self.unresolvable.insert(method);
        self
    }
}

impl ContractProvider for InMemoryContracts {
    fn contract_kind(&self, callee: MethodId) -> Option<ContractKind> {
        self.kinds.get(&callee).copied()
    }

    fn clauses(&self, method: MethodId) -> Result<Vec<ContractClause>, ContractResolutionError> {
        if self.unresolvable.contains(&method) {
            return Err(ContractResolutionError {
                method,
                reason: "unresolvable reference in contract".to_string(),
            });
        }
        Ok(self.clauses.get(&method).cloned().unwrap_or_default())
    }
}
