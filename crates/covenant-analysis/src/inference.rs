use std::cell::OnceCell;

use covenant_ir::{Apc, BlockId, BoxedExpression, Cfg, CmpOp, Context, Param, ProofOutcome};
use covenant_layer::{Decoder, Slot};
use rustc_hash::FxHashSet;

use crate::{FactBase, SymExpr, ValueState};

/// Default bound on the number of blocks a backward walk visits.
pub const DEFAULT_MAX_BACKWARD_DEPTH: usize = 400;

/// Contracts implied by the analysis results of one method.
///
/// Every query returns a lazy iterator; nothing is computed until it is
/// driven.
#[derive(Clone, Debug)]
pub struct ContractInference {
    facts: FactBase,
    max_backward_depth: usize,
}

impl ContractInference {
    pub fn new(facts: FactBase) -> Self {
        Self {
            facts,
            max_backward_depth: DEFAULT_MAX_BACKWARD_DEPTH,
        }
    }

    pub fn max_backward_depth(mut self, depth: usize) -> Self {
        self.max_backward_depth = depth;
        self
    }

    fn cfg(&self) -> &Cfg {
        self.facts.heap().cfg()
    }

    fn this_name(&self) -> String {
        let context = self.facts.values().analysis().context();
        context
            .definition()
            .and_then(|d| d.param_name(0))
            .unwrap_or("this")
            .to_owned()
    }

    /// `param != null` for every parameter that is dereferenced, unchanged,
    /// on every normal path through the method without being checked first.
    pub fn preconditions(&self) -> impl Iterator<Item = BoxedExpression> + '_ {
        let post_dominators = OnceCell::new();
        let mut seen = FxHashSet::default();
        self.cfg()
            .points()
            .filter(move |apc| !self.facts.is_unreachable(apc))
            .filter_map(move |apc| {
                let op = self.facts.heap().decode(&apc)?;
                let object = *op.dereferenced()?;
                let param = self.facts.heap().parameter_of(object)?;
                if self.facts.is_non_null(&apc, object) != ProofOutcome::Top {
                    return None;
                }
                let tree = post_dominators.get_or_init(|| self.cfg().post_dominators());
                if !tree.post_dominates(apc.block, self.cfg().entry()) {
                    return None;
                }
                if !self.reaches_entry_unchanged(apc.block, param) {
                    return None;
                }
                seen.insert(param).then_some(param)
            })
            .filter_map(move |param| {
                let entry = self.cfg().entry_point();
                self.facts.expression(&entry, self.entry(param)?)
            })
            .map(BoxedExpression::not_null)
    }

    fn entry(&self, param: Param) -> Option<crate::SymbolicValue> {
        self.facts.heap().entry_value(Slot::Param(param))
    }

    /// Walk predecessors from `block` back to the method entry. Fails when
    /// the walk runs out of budget or finds `param` rebound on the way.
    fn reaches_entry_unchanged(&self, block: BlockId, param: Param) -> bool {
        let cfg = self.cfg();
        let Some(initial) = self.entry(param) else {
            return false;
        };
        let mut visited = FxHashSet::default();
        let mut stack = vec![block];
        let mut reached = false;
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > self.max_backward_depth {
                log::trace!(
                    "backward walk from {block} in {} ran out of budget",
                    cfg.method()
                );
                return false;
            }
            let head = Apc::new(current, 0, Context::root());
            if self.facts.is_unreachable(&head) {
                continue;
            }
            if self.facts.value_of(&head, Slot::Param(param)) != Some(initial) {
                return false;
            }
            if current == cfg.entry() {
                reached = true;
                continue;
            }
            stack.extend(cfg.predecessor_edges(current).map(|e| e.from));
        }
        reached
    }

    /// Facts about the return value proven at the normal exit.
    pub fn postconditions(&self) -> impl Iterator<Item = BoxedExpression> + '_ {
        let exit = self.cfg().exit_point();
        let returns_value = self.cfg().body().returns_value;
        let result = returns_value
            .then(|| self.facts.value_of(&exit, Slot::Result))
            .flatten()
            .filter(|_| !self.facts.is_unreachable(&exit));
        result.into_iter().filter_map(move |v| {
            let state = self.facts.values().state(&exit)?;
            let ValueState::Reached(facts) = state else {
                return None;
            };
            let info = facts.info(v);
            let result = BoxedExpression::Result;
            if info.expr == Some(SymExpr::Null) {
                return Some(result.is_null());
            }
            if let Some(c) = info.interval.as_constant() {
                return Some(BoxedExpression::compare(
                    CmpOp::Eq,
                    result,
                    BoxedExpression::Constant(c),
                ));
            }
            info.nullness
                .is_non_null()
                .is_true()
                .then(|| result.not_null())
        })
    }

    /// `this.f != null` for every field a constructor leaves non-null.
    pub fn object_invariants(&self) -> impl Iterator<Item = BoxedExpression> + '_ {
        let context = self.facts.values().analysis().context();
        let is_constructor = context.definition().is_some_and(|d| d.is_constructor);
        let exit = self.cfg().exit_point();
        let fields = match (is_constructor, self.entry(Param::new(0))) {
            (true, Some(this)) if !self.facts.is_unreachable(&exit) => self
                .facts
                .heap()
                .state(&exit)
                .map(|s| s.fields_of(this))
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        fields.into_iter().filter_map(move |(field, v)| {
            if !self.facts.is_non_null(&exit, v).is_true() {
                return None;
            }
            let name = context.metadata().field_name(field);
            Some(BoxedExpression::variable(self.this_name()).field(name).not_null())
        })
    }
}
