use std::sync::Arc;

use covenant_ir::{Apc, Cfg, ContractProvider};

use crate::{Decoder, Operation};

/// A decoder with calls into the contract library elided.
///
/// Assertion calls become a `pop` of their arguments, so the stack effect is
/// unchanged and every point keeps its position. The graph is shared with
/// the wrapped decoder.
pub struct ContractFreeView<D> {
    inner: Arc<D>,
    contracts: Arc<dyn ContractProvider>,
}

impl<D: Decoder> ContractFreeView<D> {
    pub fn new(inner: Arc<D>, contracts: Arc<dyn ContractProvider>) -> Self {
        Self { inner, contracts }
    }

    pub fn inner(&self) -> &Arc<D> {
        &self.inner
    }

    fn elide(&self, op: Operation<D::Variable>) -> Operation<D::Variable> {
        match op {
            Operation::Call {
                dest: None,
                method,
                args,
            } if self
                .contracts
                .contract_kind(method)
                .is_some_and(|kind| kind.is_assertion()) =>
            {
                Operation::Pop { values: args }
            }
            op => op,
        }
    }
}

impl<D: Decoder> Decoder for ContractFreeView<D> {
    type Variable = D::Variable;
    type Expression = D::Expression;

    fn cfg(&self) -> &Arc<Cfg> {
        self.inner.cfg()
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<D::Variable>> {
        self.inner.decode(apc).map(|op| self.elide(op))
    }

    fn expression(&self, apc: &Apc, var: &D::Variable) -> Option<D::Expression> {
        self.inner.expression(apc, var)
    }
}

impl<D> std::fmt::Debug for ContractFreeView<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractFreeView").finish_non_exhaustive()
    }
}
