use std::sync::Arc;

use covenant_ir::{
    Apc, Cfg, EdgeKind, FieldId, HandlerKind, HasBottom, HasTop, Instruction, Lattice, Local,
    Param, Successor,
};
use covenant_layer::{
    AbstractValue, Access, AnalysisDivergence, CodeLayer, Decoder, FixpointResult,
    ForwardAnalysis, Operation, Slot, WideningStrategy,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::SymbolicValue;
use crate::symbolic::{MemoKey, SymbolicFactory};

/// Pairs `(incoming, merged)`: the value flowing along an edge and the merge
/// value standing for it at the target.
pub type Renaming = SmallVec<[(SymbolicValue, SymbolicValue); 4]>;

/// Must-hold facts at a point: which value every known slot holds, and
/// which value is stored in a field of a known object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapFacts {
    slots: FxHashMap<Slot, SymbolicValue>,
    fields: FxHashMap<(SymbolicValue, FieldId), SymbolicValue>,
}

impl HeapFacts {
    fn contains_all(&self, other: &HeapFacts) -> bool {
        other.slots.iter().all(|(k, v)| self.slots.get(k) == Some(v))
            && other.fields.iter().all(|(k, v)| self.fields.get(k) == Some(v))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapState {
    /// No execution reaches the point.
    Bottom,
    Reached(HeapFacts),
}

impl HeapState {
    pub fn slot(&self, slot: Slot) -> Option<SymbolicValue> {
        match self {
            HeapState::Reached(facts) => facts.slots.get(&slot).copied(),
            HeapState::Bottom => None,
        }
    }

    pub fn field(&self, object: SymbolicValue, field: FieldId) -> Option<SymbolicValue> {
        match self {
            HeapState::Reached(facts) => facts.fields.get(&(object, field)).copied(),
            HeapState::Bottom => None,
        }
    }

    /// Known field contents of `object`, sorted by field.
    pub fn fields_of(&self, object: SymbolicValue) -> Vec<(FieldId, SymbolicValue)> {
        let HeapState::Reached(facts) = self else {
            return Vec::new();
        };
        let mut fields: Vec<_> = facts
            .fields
            .iter()
            .filter(|((o, _), _)| *o == object)
            .map(|((_, f), v)| (*f, *v))
            .collect();
        fields.sort();
        fields
    }

    fn facts_mut(&mut self) -> Option<&mut HeapFacts> {
        match self {
            HeapState::Reached(facts) => Some(facts),
            HeapState::Bottom => None,
        }
    }
}

impl Lattice for HeapState {
    /// Facts holding on both sides. Analyses merge through
    /// [`HeapAnalysis`], which also keeps disagreeing keys under a merge
    /// value.
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (HeapState::Bottom, x) | (x, HeapState::Bottom) => x.clone(),
            (HeapState::Reached(a), HeapState::Reached(b)) => {
                let mut out = a.clone();
                out.slots.retain(|k, v| b.slots.get(k) == Some(v));
                out.fields.retain(|k, v| b.fields.get(k) == Some(v));
                HeapState::Reached(out)
            }
        }
    }

    fn meet(&self, other: &Self) -> Self {
        let (HeapState::Reached(a), HeapState::Reached(b)) = (self, other) else {
            return HeapState::Bottom;
        };
        let mut out = a.clone();
        for (k, v) in &b.slots {
            if *out.slots.entry(*k).or_insert(*v) != *v {
                return HeapState::Bottom;
            }
        }
        for (k, v) in &b.fields {
            if *out.fields.entry(*k).or_insert(*v) != *v {
                return HeapState::Bottom;
            }
        }
        HeapState::Reached(out)
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        match (self, other) {
            (HeapState::Bottom, _) => true,
            (HeapState::Reached(_), HeapState::Bottom) => false,
            (HeapState::Reached(a), HeapState::Reached(b)) => a.contains_all(b),
        }
    }
}

impl HasBottom for HeapState {
    fn bottom() -> Self {
        HeapState::Bottom
    }
}

impl HasTop for HeapState {
    fn top() -> Self {
        HeapState::Reached(HeapFacts::default())
    }
}

impl AbstractValue for HeapState {
    fn widen(&self, next: &Self) -> Self {
        self.join(next)
    }
}

/// Assigns a symbolic value to every slot and known field.
///
/// Values that disagree at a merge point are replaced by one merge value per
/// point and key, so the number of values per method is bounded and the
/// fixpoint terminates without widening.
#[derive(Debug)]
pub struct HeapAnalysis {
    cfg: Arc<Cfg>,
    factory: SymbolicFactory,
}

impl HeapAnalysis {
    pub fn new(cfg: Arc<Cfg>) -> Self {
        Self {
            cfg,
            factory: SymbolicFactory::default(),
        }
    }

    /// Every parameter and local holds its own value on entry.
    pub fn initial_state(&mut self) -> HeapState {
        let entry = self.cfg.entry_point();
        let body = self.cfg.body().clone();
        let mut facts = HeapFacts::default();
        let slots = (0..body.params)
            .map(|p| Slot::Param(Param::new(p)))
            .chain((0..body.locals).map(|l| Slot::Local(Local::new(l))));
        for slot in slots {
            let value = self.factory.value(&entry, MemoKey::Slot(slot));
            facts.slots.insert(slot, value);
        }
        HeapState::Reached(facts)
    }

    fn read(&mut self, apc: &Apc, facts: &mut HeapFacts, slot: Slot) -> SymbolicValue {
        if let Some(value) = facts.slots.get(&slot) {
            return *value;
        }
        let value = self.factory.value(apc, MemoKey::Slot(slot));
        facts.slots.insert(slot, value);
        value
    }

    fn apply(&mut self, apc: &Apc, op: &Operation<Slot>, state: &HeapState) -> HeapState {
        let HeapState::Reached(facts) = state else {
            return HeapState::Bottom;
        };
        let mut facts = facts.clone();
        let reads: SmallVec<[SymbolicValue; 4]> = op
            .reads()
            .into_iter()
            .map(|slot| self.read(apc, &mut facts, *slot))
            .collect();

        match op {
            Operation::Copy { dest, .. } => {
                facts.slots.insert(*dest, reads[0]);
            }
            Operation::LoadField { dest, field, .. } => {
                let object = reads[0];
                let value = match facts.fields.get(&(object, *field)) {
                    Some(value) => *value,
                    None => {
                        let value = self.factory.value(apc, MemoKey::Field(object, *field));
                        facts.fields.insert((object, *field), value);
                        value
                    }
                };
                facts.slots.insert(*dest, value);
            }
            Operation::StoreField { field, .. } => {
                // Any object may alias the target.
                facts.fields.retain(|(_, f), _| f != field);
                facts.fields.insert((reads[0], *field), reads[1]);
            }
            Operation::NewObj { dest, .. } | Operation::Call { dest: Some(dest), .. } => {
                facts.fields.clear();
                facts.slots.insert(*dest, self.factory.value(apc, MemoKey::Def));
            }
            Operation::Call { dest: None, .. } => facts.fields.clear(),
            Operation::LoadNull { dest }
            | Operation::LoadConst { dest, .. }
            | Operation::Binary { dest, .. }
            | Operation::Unary { dest, .. }
            | Operation::Compare { dest, .. } => {
                facts.slots.insert(*dest, self.factory.value(apc, MemoKey::Def));
            }
            Operation::Return { value: Some(_) } => {
                facts.slots.insert(Slot::Result, reads[0]);
            }
            Operation::Nop
            | Operation::Pop { .. }
            | Operation::Branch
            | Operation::BranchTrue { .. }
            | Operation::BranchFalse { .. }
            | Operation::Switch { .. }
            | Operation::Return { value: None }
            | Operation::Throw { .. }
            | Operation::EndFinally => {}
        }
        HeapState::Reached(facts)
    }

    fn refine_edge(
        &mut self,
        from: &Apc,
        op: &Operation<Slot>,
        to: &Successor,
        mut state: HeapState,
    ) -> HeapState {
        let cfg = self.cfg.clone();
        let Some(facts) = state.facts_mut() else {
            return state;
        };
        // A callee that raises may have written any field first.
        let calls_out = matches!(op, Operation::Call { .. } | Operation::NewObj { .. });
        if to.is_exceptional() && calls_out {
            facts.fields.clear();
        }
        let clears_stack = matches!(
            to.kind,
            EdgeKind::Handler(_)
                | EdgeKind::Unwind
                | EdgeKind::Leave { .. }
                | EdgeKind::SubroutineReturn
        ) || matches!(cfg.instruction(from), Some(Instruction::Leave(_)));
        if clears_stack {
            facts.slots.retain(|slot, _| !matches!(slot, Slot::Stack(_)));
        }
        let enters_catch = to.apc.index == 0
            && matches!(to.kind, EdgeKind::Handler(_) | EdgeKind::SubroutineReturn)
            && cfg
                .subroutines()
                .iter()
                .any(|s| s.entry == to.apc.block && matches!(s.kind, HandlerKind::Catch(_)));
        if enters_catch {
            let exception = self.factory.value(&to.apc, MemoKey::Exception);
            facts.slots.insert(Slot::Stack(0), exception);
        }
        state
    }

    fn merge(&mut self, at: &Apc, current: &HeapState, incoming: &HeapState) -> HeapState {
        let (HeapState::Reached(a), HeapState::Reached(b)) = (current, incoming) else {
            return current.join(incoming);
        };
        let mut out = HeapFacts::default();
        for (slot, va) in &a.slots {
            if let Some(vb) = b.slots.get(slot) {
                let value = if va == vb {
                    *va
                } else {
                    self.factory.value(at, MemoKey::Slot(*slot))
                };
                out.slots.insert(*slot, value);
            }
        }
        for (key, va) in &a.fields {
            if let Some(vb) = b.fields.get(key) {
                let value = if va == vb {
                    *va
                } else {
                    self.factory.value(at, MemoKey::Field(key.0, key.1))
                };
                out.fields.insert(*key, value);
            }
        }
        HeapState::Reached(out)
    }

    /// `op` with reads named by the pre-state and the write by the
    /// post-state.
    fn rename(
        &mut self,
        apc: &Apc,
        op: &Operation<Slot>,
        pre: &HeapState,
        post: &HeapState,
    ) -> Option<Operation<SymbolicValue>> {
        let HeapState::Reached(facts) = pre else {
            return None;
        };
        let mut facts = facts.clone();
        Some(op.clone().map(|slot, access| match access {
            Access::Read => self.read(apc, &mut facts, slot),
            Access::Write => post
                .slot(slot)
                .unwrap_or_else(|| self.factory.value(apc, MemoKey::Def)),
        }))
    }
}

impl ForwardAnalysis<Slot> for HeapAnalysis {
    type State = HeapState;

    fn transfer(&mut self, apc: &Apc, op: &Operation<Slot>, state: &HeapState) -> HeapState {
        self.apply(apc, op, state)
    }

    fn refine(
        &mut self,
        from: &Apc,
        op: &Operation<Slot>,
        to: &Successor,
        state: HeapState,
    ) -> HeapState {
        self.refine_edge(from, op, to, state)
    }

    fn join(&mut self, at: &Apc, current: &HeapState, incoming: &HeapState) -> HeapState {
        self.merge(at, current, incoming)
    }

    fn widen(&mut self, at: &Apc, current: &HeapState, incoming: &HeapState) -> HeapState {
        self.merge(at, current, incoming)
    }
}

/// Decoder of the value layer: the contract-free stack operations with
/// every slot replaced by the symbolic value it holds.
///
/// Built by running [`HeapAnalysis`] to its fixpoint. Points no state
/// reaches decode to nothing.
pub struct HeapDecoder {
    cfg: Arc<Cfg>,
    result: FixpointResult<HeapAnalysis, HeapState>,
    operations: FxHashMap<Apc, Operation<SymbolicValue>>,
    renamings: FxHashMap<(Apc, Apc), Renaming>,
    entry: FxHashMap<Slot, SymbolicValue>,
}

impl HeapDecoder {
    pub fn analyze<D>(
        layer: &CodeLayer<D>,
        max_iterations: usize,
        widening: WideningStrategy,
    ) -> Self
    where
        D: Decoder<Variable = Slot>,
    {
        let cfg = layer.cfg().clone();
        let mut analysis = HeapAnalysis::new(cfg.clone());
        let initial = analysis.initial_state();
        let entry = match &initial {
            HeapState::Reached(facts) => facts.slots.clone(),
            HeapState::Bottom => FxHashMap::default(),
        };
        let mut result = layer
            .create_forward(analysis)
            .max_iterations(max_iterations)
            .widening(widening)
            .run(initial);

        let points: Vec<Apc> = result.points().cloned().collect();
        let mut operations = FxHashMap::default();
        let mut renamings = FxHashMap::default();
        for apc in points {
            let (Some(pre), Some(op)) = (result.exact(&apc).cloned(), layer.decode(&apc)) else {
                continue;
            };
            let analysis = result.analysis_mut();
            let post = analysis.apply(&apc, &op, &pre);
            let renamed = analysis.rename(&apc, &op, &pre, &post);
            let outgoing: Vec<(Apc, HeapState)> = cfg
                .successors(&apc)
                .into_iter()
                .map(|succ| {
                    let leaving = if succ.is_exceptional() { &pre } else { &post };
                    let out = analysis.refine_edge(&apc, &op, &succ, leaving.clone());
                    (succ.apc, out)
                })
                .collect();
            for (to, out) in outgoing {
                let Some(target) = result.exact(&to) else {
                    continue;
                };
                let renaming = differences(&out, target);
                if !renaming.is_empty() {
                    renamings.insert((apc.clone(), to), renaming);
                }
            }
            if let Some(renamed) = renamed {
                operations.insert(apc, renamed);
            }
        }
        log::debug!(
            "heap layer of {}: {} decoded points, {} renaming edges",
            cfg.method(),
            operations.len(),
            renamings.len()
        );

        Self {
            cfg,
            result,
            operations,
            renamings,
            entry,
        }
    }

    /// Heap facts before the operation at `apc`.
    pub fn state(&self, apc: &Apc) -> Option<HeapState> {
        self.result.state(apc)
    }

    pub fn is_unreachable(&self, apc: &Apc) -> bool {
        self.state(apc).is_none_or(|s| s.is_bottom())
    }

    /// Value held by `slot` before the operation at `apc`.
    pub fn value_at(&self, apc: &Apc, slot: Slot) -> Option<SymbolicValue> {
        self.state(apc)?.slot(slot)
    }

    /// Value a parameter or local holds on entry.
    pub fn entry_value(&self, slot: Slot) -> Option<SymbolicValue> {
        self.entry.get(&slot).copied()
    }

    /// The parameter whose entry value is `value`.
    pub fn parameter_of(&self, value: SymbolicValue) -> Option<Param> {
        self.entry.iter().find_map(|(slot, v)| match slot {
            Slot::Param(p) if *v == value => Some(*p),
            _ => None,
        })
    }

    /// Values renamed to merge values along the edge `from -> to`.
    pub fn renaming(&self, from: &Apc, to: &Apc) -> &[(SymbolicValue, SymbolicValue)] {
        self.renamings
            .get(&(from.clone(), to.clone()))
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    pub fn divergence(&self) -> Option<&AnalysisDivergence> {
        self.result.divergence()
    }
}

fn differences(out: &HeapState, target: &HeapState) -> Renaming {
    let (HeapState::Reached(out), HeapState::Reached(target)) = (out, target) else {
        return Renaming::new();
    };
    let mut renaming = Renaming::new();
    let slots = target
        .slots
        .iter()
        .filter_map(|(k, t)| out.slots.get(k).map(|v| (*v, *t)));
    let fields = target
        .fields
        .iter()
        .filter_map(|(k, t)| out.fields.get(k).map(|v| (*v, *t)));
    for (v, t) in slots.chain(fields) {
        if v != t && !renaming.contains(&(v, t)) {
            renaming.push((v, t));
        }
    }
    renaming.sort();
    renaming
}

impl Decoder for HeapDecoder {
    type Variable = SymbolicValue;
    type Expression = SymbolicValue;

    fn cfg(&self) -> &Arc<Cfg> {
        &self.cfg
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<SymbolicValue>> {
        self.operations.get(apc).cloned()
    }

    fn expression(&self, _apc: &Apc, var: &SymbolicValue) -> Option<SymbolicValue> {
        Some(*var)
    }
}

impl std::fmt::Debug for HeapDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapDecoder")
            .field("method", &self.cfg.method())
            .field("points", &self.operations.len())
            .finish_non_exhaustive()
    }
}
