use std::fmt;
use std::sync::Arc;

use covenant_ir::{
    Apc, BinaryOp, BoxedExpression, ClauseKind, CmpOp, ContractResolutionError, EdgeKind, FieldId, HasBottom,
    HasTop, Lattice, Local, MethodId, Param, ProofOutcome, Successor, UnaryOp,
};
use covenant_layer::{
    AbstractValue, AnalysisDivergence, CodeLayer, Decoder, FixpointResult, ForwardAnalysis,
    MethodContext, Operation, Slot, WideningStrategy,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{HeapDecoder, Interval, Nullness, SymbolicValue};

/// How a value was computed, one operation deep.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum SymExpr {
    Null,
    Const(i64),
    Binary(BinaryOp, SymbolicValue, SymbolicValue),
    Unary(UnaryOp, SymbolicValue),
    Compare(CmpOp, SymbolicValue, SymbolicValue),
    Field(SymbolicValue, FieldId),
    New(MethodId),
    Call(MethodId),
}

impl SymExpr {
    fn mentions(&self, v: SymbolicValue) -> bool {
        match self {
            SymExpr::Binary(_, a, b) | SymExpr::Compare(_, a, b) => *a == v || *b == v,
            SymExpr::Unary(_, a) | SymExpr::Field(a, _) => *a == v,
            SymExpr::Null | SymExpr::Const(_) | SymExpr::New(_) | SymExpr::Call(_) => false,
        }
    }
}

/// What is known about one value at one point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueInfo {
    pub expr: Option<SymExpr>,
    pub nullness: Nullness,
    pub interval: Interval,
}

impl Default for ValueInfo {
    fn default() -> Self {
        Self {
            expr: None,
            nullness: Nullness::Top,
            interval: Interval::top(),
        }
    }
}

impl ValueInfo {
    fn defined(expr: SymExpr, nullness: Nullness, interval: Interval) -> Self {
        Self {
            expr: Some(expr),
            nullness,
            interval,
        }
    }

    fn constant(expr: SymExpr, value: i64) -> Self {
        let nullness = if value == 0 {
            Nullness::Null
        } else {
            Nullness::NonNull
        };
        Self::defined(expr, nullness, Interval::constant(value))
    }

    fn is_contradiction(&self) -> bool {
        self.nullness == Nullness::Bottom || self.interval.is_empty()
    }

    fn combine(&self, other: &Self, interval: Interval) -> Self {
        Self {
            expr: (self.expr == other.expr).then(|| self.expr.clone()).flatten(),
            nullness: self.nullness.join(&other.nullness),
            interval,
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        (other.expr.is_none() || self.expr == other.expr)
            && self.nullness.is_subseteq(&other.nullness)
            && self.interval.is_subseteq(&other.interval)
    }
}

impl fmt::Display for ValueInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.nullness, self.interval)
    }
}

/// A comparison known to hold between two values.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Relation {
    pub left: SymbolicValue,
    pub op: CmpOp,
    pub right: SymbolicValue,
}

impl Relation {
    fn mentions(&self, v: SymbolicValue) -> bool {
        self.left == v || self.right == v
    }

    fn substitute(&self, from: SymbolicValue, to: SymbolicValue) -> Option<Self> {
        if !self.mentions(from) {
            return None;
        }
        let swap = |x: SymbolicValue| if x == from { to } else { x };
        Some(Relation {
            left: swap(self.left),
            op: self.op,
            right: swap(self.right),
        })
    }
}

/// Whether knowing `known` settles `asked` to true.
fn implies(known: CmpOp, asked: CmpOp) -> bool {
    known == asked
        || matches!(
            (known, asked),
            (CmpOp::Lt, CmpOp::Le | CmpOp::Ne)
                | (CmpOp::Gt, CmpOp::Ge | CmpOp::Ne)
                | (CmpOp::Eq, CmpOp::Le | CmpOp::Ge)
        )
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueFacts {
    values: FxHashMap<SymbolicValue, ValueInfo>,
    relations: FxHashSet<Relation>,
}

impl ValueFacts {
    /// What is known about `v`; everything for values never seen.
    pub fn info(&self, v: SymbolicValue) -> ValueInfo {
        self.values.get(&v).cloned().unwrap_or_default()
    }

    pub fn expr(&self, v: SymbolicValue) -> Option<&SymExpr> {
        self.values.get(&v).and_then(|i| i.expr.as_ref())
    }

    fn info_mut(&mut self, v: SymbolicValue) -> &mut ValueInfo {
        self.values.entry(v).or_default()
    }

    fn define(&mut self, v: SymbolicValue, info: ValueInfo) {
        self.forget(v);
        self.values.insert(v, info);
    }

    /// Drop every fact about `v` before it is redefined.
    fn forget(&mut self, v: SymbolicValue) {
        self.values.remove(&v);
        self.relations.retain(|r| !r.mentions(v));
        for info in self.values.values_mut() {
            if info.expr.as_ref().is_some_and(|e| e.mentions(v)) {
                info.expr = None;
            }
        }
    }

    fn is_consistent(&self) -> bool {
        !self.values.values().any(ValueInfo::is_contradiction)
    }

    fn holds(&self, a: SymbolicValue, op: CmpOp, b: SymbolicValue) -> bool {
        self.relations.iter().any(|r| {
            (r.left == a && r.right == b && implies(r.op, op))
                || (r.left == b && r.right == a && implies(r.op, op.flip()))
        })
    }

    /// Whether `a op b` holds.
    pub fn decide(&self, op: CmpOp, a: SymbolicValue, b: SymbolicValue) -> ProofOutcome {
        if a == b {
            return ProofOutcome::from_bool(matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge));
        }
        if self.holds(a, op, b) {
            return ProofOutcome::True;
        }
        if self.holds(a, op.negate(), b) {
            return ProofOutcome::False;
        }
        let (ia, ib) = (self.info(a), self.info(b));
        if matches!(op, CmpOp::Eq | CmpOp::Ne) {
            let equal = match (ia.nullness, ib.nullness) {
                (Nullness::Null, Nullness::Null) => ProofOutcome::True,
                (Nullness::Null, Nullness::NonNull) | (Nullness::NonNull, Nullness::Null) => {
                    ProofOutcome::False
                }
                _ => ProofOutcome::Top,
            };
            let outcome = if op == CmpOp::Eq {
                equal
            } else {
                equal.negate()
            };
            if outcome != ProofOutcome::Top {
                return outcome;
            }
        }
        ia.interval.compare(op, &ib.interval)
    }

    /// Assume `v` is truthy (or falsy). Returns false on contradiction.
    fn assume(&mut self, v: SymbolicValue, truth: bool) -> bool {
        let consistent = match self.expr(v).cloned() {
            Some(SymExpr::Compare(op, a, b)) => {
                let op = if truth { op } else { op.negate() };
                self.assume_compare(a, op, b)
            }
            _ => true,
        };
        let info = self.info_mut(v);
        if truth {
            info.nullness = info.nullness.meet(&Nullness::NonNull);
            info.interval = info.interval.assume(CmpOp::Ne, &Interval::constant(0));
        } else {
            info.nullness = info.nullness.meet(&Nullness::Null);
            info.interval = info.interval.meet(&Interval::constant(0));
        }
        consistent && self.is_consistent()
    }

    fn assume_compare(&mut self, a: SymbolicValue, op: CmpOp, b: SymbolicValue) -> bool {
        if self.decide(op, a, b) == ProofOutcome::False {
            return false;
        }
        let (ia, ib) = (self.info(a), self.info(b));
        match op {
            CmpOp::Eq => {
                let nullness = ia.nullness.meet(&ib.nullness);
                self.info_mut(a).nullness = nullness;
                self.info_mut(b).nullness = nullness;
            }
            CmpOp::Ne => {
                if ib.nullness == Nullness::Null {
                    let info = self.info_mut(a);
                    info.nullness = info.nullness.meet(&Nullness::NonNull);
                }
                if ia.nullness == Nullness::Null {
                    let info = self.info_mut(b);
                    info.nullness = info.nullness.meet(&Nullness::NonNull);
                }
            }
            _ => {}
        }
        self.info_mut(a).interval = ia.interval.assume(op, &ib.interval);
        self.info_mut(b).interval = ib.interval.assume(op.flip(), &ia.interval);
        if a != b {
            self.relations.insert(Relation { left: a, op, right: b });
        }
        self.is_consistent()
    }

    /// Move the facts of each incoming value to the merge value that stands
    /// for it at the edge target.
    fn rename(&mut self, renaming: &[(SymbolicValue, SymbolicValue)]) {
        if renaming.is_empty() {
            return;
        }
        let infos: Vec<_> = renaming
            .iter()
            .map(|(v, t)| (*t, self.values.get(v).cloned()))
            .collect();
        let relations: Vec<Relation> = self
            .relations
            .iter()
            .flat_map(|r| renaming.iter().filter_map(move |(v, t)| r.substitute(*v, *t)))
            .collect();
        self.relations
            .retain(|r| !renaming.iter().any(|(_, t)| r.mentions(*t)));
        for (t, info) in infos {
            match info {
                Some(info) => self.values.insert(t, info),
                None => self.values.remove(&t),
            };
        }
        self.relations.extend(relations);
    }

    fn merge(&self, other: &Self, widen: bool) -> Self {
        let values = self
            .values
            .iter()
            .filter_map(|(v, a)| {
                let b = other.values.get(v)?;
                let interval = if widen {
                    a.interval.widen(&b.interval)
                } else {
                    a.interval.join(&b.interval)
                };
                Some((*v, a.combine(b, interval)))
            })
            .collect();
        let relations = self
            .relations
            .intersection(&other.relations)
            .copied()
            .collect();
        ValueFacts { values, relations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueState {
    Bottom,
    Reached(ValueFacts),
}

impl ValueState {
    pub fn facts(&self) -> Option<&ValueFacts> {
        match self {
            ValueState::Reached(facts) => Some(facts),
            ValueState::Bottom => None,
        }
    }
}

impl Lattice for ValueState {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ValueState::Bottom, x) | (x, ValueState::Bottom) => x.clone(),
            (ValueState::Reached(a), ValueState::Reached(b)) => {
                ValueState::Reached(a.merge(b, false))
            }
        }
    }

    fn meet(&self, other: &Self) -> Self {
        let (ValueState::Reached(a), ValueState::Reached(b)) = (self, other) else {
            return ValueState::Bottom;
        };
        let mut out = a.clone();
        for (v, ib) in &b.values {
            let ia = out.info(*v);
            let expr = ia.expr.clone().or_else(|| ib.expr.clone());
            out.values.insert(
                *v,
                ValueInfo {
                    expr,
                    nullness: ia.nullness.meet(&ib.nullness),
                    interval: ia.interval.meet(&ib.interval),
                },
            );
        }
        out.relations.extend(b.relations.iter().copied());
        if out.is_consistent() {
            ValueState::Reached(out)
        } else {
            ValueState::Bottom
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueState::Bottom, _) => true,
            (ValueState::Reached(_), ValueState::Bottom) => false,
            (ValueState::Reached(a), ValueState::Reached(b)) => {
                b.values.iter().all(|(v, ib)| a.info(*v).is_subseteq(ib))
                    && b.relations.is_subset(&a.relations)
            }
        }
    }
}

impl HasBottom for ValueState {
    fn bottom() -> Self {
        ValueState::Bottom
    }
}

impl HasTop for ValueState {
    fn top() -> Self {
        ValueState::Reached(ValueFacts::default())
    }
}

impl AbstractValue for ValueState {
    fn widen(&self, next: &Self) -> Self {
        match (self, next) {
            (ValueState::Bottom, x) | (x, ValueState::Bottom) => x.clone(),
            (ValueState::Reached(a), ValueState::Reached(b)) => {
                ValueState::Reached(a.merge(b, true))
            }
        }
    }
}

/// Tracks expressions, nullness, ranges and comparisons of the symbolic
/// values computed by the heap analysis.
pub struct ValueAnalysis {
    heap: Arc<HeapDecoder>,
    context: Arc<MethodContext>,
    contract_error: Option<ContractResolutionError>,
}

impl ValueAnalysis {
    pub fn new(heap: Arc<HeapDecoder>, context: Arc<MethodContext>) -> Self {
        Self {
            heap,
            context,
            contract_error: None,
        }
    }

    pub fn heap(&self) -> &Arc<HeapDecoder> {
        &self.heap
    }

    pub fn context(&self) -> &Arc<MethodContext> {
        &self.context
    }

    /// Entry facts: the receiver is non-null, locals hold their default
    /// value, and declared null checks on parameters hold.
    pub fn initial_state(&mut self) -> ValueState {
        let mut facts = ValueFacts::default();
        let locals = self.context.cfg().body().locals;
        let def = self.context.definition();

        if def.is_some_and(|d| !d.is_static) {
            if let Some(this) = self.heap.entry_value(Slot::Param(Param::new(0))) {
                facts.info_mut(this).nullness = Nullness::NonNull;
            }
        }
        for local in 0..locals {
            if let Some(v) = self.heap.entry_value(Slot::Local(Local::new(local))) {
                facts.define(v, ValueInfo::constant(SymExpr::Const(0), 0));
            }
        }

        match self.context.contracts().clauses(self.context.method()) {
            Ok(clauses) => {
                for clause in clauses.iter().filter(|c| c.kind == ClauseKind::Requires) {
                    let Some((BoxedExpression::Variable(name), non_null)) =
                        clause.condition.as_null_check()
                    else {
                        continue;
                    };
                    let param = def.and_then(|d| d.param_named(name));
                    let slot = param.map(|p| Slot::Param(Param::new(p)));
                    let Some(v) = slot.and_then(|s| self.heap.entry_value(s)) else {
                        continue;
                    };
                    let nullness = if non_null {
                        Nullness::NonNull
                    } else {
                        Nullness::Null
                    };
                    let info = facts.info_mut(v);
                    info.nullness = info.nullness.meet(&nullness);
                }
            }
            Err(err) => {
                log::warn!("{err}; analyzing as if the method had no contract");
                self.contract_error = Some(err);
            }
        }
        ValueState::Reached(facts)
    }

    /// State after `op` at `apc`.
    pub fn apply(&self, op: &Operation<SymbolicValue>, state: &ValueState) -> ValueState {
        let ValueState::Reached(facts) = state else {
            return ValueState::Bottom;
        };
        let mut facts = facts.clone();
        match op {
            Operation::LoadNull { dest } => {
                facts.define(*dest, ValueInfo::constant(SymExpr::Null, 0));
            }
            Operation::LoadConst { dest, value } => {
                facts.define(*dest, ValueInfo::constant(SymExpr::Const(*value), *value));
            }
            Operation::Binary {
                dest,
                op,
                left,
                right,
            } => {
                let interval = facts
                    .info(*left)
                    .interval
                    .binary(*op, &facts.info(*right).interval);
                let expr = SymExpr::Binary(*op, *left, *right);
                facts.define(*dest, ValueInfo::defined(expr, Nullness::Top, interval));
            }
            Operation::Unary { dest, op, operand } => {
                let interval = match op {
                    UnaryOp::Neg => facts.info(*operand).interval.negate(),
                    UnaryOp::Not => Interval::top(),
                };
                let expr = SymExpr::Unary(*op, *operand);
                facts.define(*dest, ValueInfo::defined(expr, Nullness::Top, interval));
            }
            Operation::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let expr = SymExpr::Compare(*op, *left, *right);
                let info = match facts.decide(*op, *left, *right) {
                    ProofOutcome::True => ValueInfo::constant(expr, 1),
                    ProofOutcome::False => ValueInfo::constant(expr, 0),
                    _ => ValueInfo::defined(expr, Nullness::Top, Interval::new(0, 1)),
                };
                facts.define(*dest, info);
            }
            Operation::NewObj { dest, ctor, .. } => {
                let info = ValueInfo::defined(SymExpr::New(*ctor), Nullness::NonNull, Interval::top());
                facts.define(*dest, info);
                self.assume_ensures(*ctor, *dest, &mut facts);
            }
            Operation::Call {
                dest: Some(dest),
                method,
                ..
            } => {
                let info = ValueInfo::defined(SymExpr::Call(*method), Nullness::Top, Interval::top());
                facts.define(*dest, info);
                self.assume_ensures(*method, *dest, &mut facts);
            }
            Operation::LoadField {
                dest,
                object,
                field,
            } => {
                let info = facts.info_mut(*object);
                info.nullness = info.nullness.meet(&Nullness::NonNull);
                facts
                    .values
                    .entry(*dest)
                    .or_insert_with(|| ValueInfo {
                        expr: Some(SymExpr::Field(*object, *field)),
                        ..ValueInfo::default()
                    });
            }
            Operation::StoreField { object, .. } => {
                let info = facts.info_mut(*object);
                info.nullness = info.nullness.meet(&Nullness::NonNull);
            }
            Operation::Nop
            | Operation::Copy { .. }
            | Operation::Call { dest: None, .. }
            | Operation::Pop { .. }
            | Operation::Branch
            | Operation::BranchTrue { .. }
            | Operation::BranchFalse { .. }
            | Operation::Switch { .. }
            | Operation::Return { .. }
            | Operation::Throw { .. }
            | Operation::EndFinally => {}
        }
        if facts.is_consistent() {
            ValueState::Reached(facts)
        } else {
            ValueState::Bottom
        }
    }

    /// Assume what `callee` ensures about its result, now held by `result`.
    /// Only null checks and comparisons against constants are understood.
    fn assume_ensures(&self, callee: MethodId, result: SymbolicValue, facts: &mut ValueFacts) {
        let clauses = match self.context.contracts().clauses(callee) {
            Ok(clauses) => clauses,
            Err(err) => {
                log::debug!("{err}; assuming nothing about the result of {callee}");
                return;
            }
        };
        for clause in clauses.iter().filter(|c| c.kind == ClauseKind::Ensures) {
            if let Some((BoxedExpression::Result, non_null)) = clause.condition.as_null_check() {
                let nullness = if non_null {
                    Nullness::NonNull
                } else {
                    Nullness::Null
                };
                let info = facts.info_mut(result);
                info.nullness = info.nullness.meet(&nullness);
                continue;
            }
            let BoxedExpression::Compare(op, left, right) = &clause.condition else {
                continue;
            };
            let (op, bound) = match (left.as_ref(), right.as_ref()) {
                (BoxedExpression::Result, BoxedExpression::Constant(c)) => (*op, *c),
                (BoxedExpression::Constant(c), BoxedExpression::Result) => (op.flip(), *c),
                _ => continue,
            };
            let info = facts.info_mut(result);
            info.interval = info.interval.assume(op, &Interval::constant(bound));
        }
    }

    fn refine_edge(
        &self,
        from: &Apc,
        op: &Operation<SymbolicValue>,
        to: &Successor,
        state: ValueState,
    ) -> ValueState {
        let ValueState::Reached(mut facts) = state else {
            return ValueState::Bottom;
        };
        let consistent = match (op, &to.kind) {
            (
                Operation::BranchTrue { cond } | Operation::BranchFalse { cond },
                EdgeKind::True,
            ) => facts.assume(*cond, true),
            (
                Operation::BranchTrue { cond } | Operation::BranchFalse { cond },
                EdgeKind::False,
            ) => facts.assume(*cond, false),
            (Operation::Switch { value }, EdgeKind::Case(case)) => {
                let info = facts.info_mut(*value);
                info.interval = info.interval.meet(&Interval::constant(i64::from(*case)));
                facts.is_consistent()
            }
            _ => true,
        };
        if !consistent {
            return ValueState::Bottom;
        }
        facts.rename(self.heap.renaming(from, &to.apc));
        ValueState::Reached(facts)
    }
}

impl ForwardAnalysis<SymbolicValue> for ValueAnalysis {
    type State = ValueState;

    fn transfer(
        &mut self,
        _apc: &Apc,
        op: &Operation<SymbolicValue>,
        state: &ValueState,
    ) -> ValueState {
        self.apply(op, state)
    }

    fn refine(
        &mut self,
        from: &Apc,
        op: &Operation<SymbolicValue>,
        to: &Successor,
        state: ValueState,
    ) -> ValueState {
        self.refine_edge(from, op, to, state)
    }
}

/// A query about the values at one point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    IsNull(SymbolicValue),
    IsNonNull(SymbolicValue),
    Compare(CmpOp, SymbolicValue, Operand),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Value(SymbolicValue),
    Constant(i64),
}

/// Fixpoint of [`ValueAnalysis`] over the value layer.
pub struct Values {
    result: FixpointResult<ValueAnalysis, ValueState>,
}

impl Values {
    pub fn analyze(
        layer: &CodeLayer<HeapDecoder>,
        max_iterations: usize,
        widening: WideningStrategy,
    ) -> Self {
        let mut analysis = ValueAnalysis::new(layer.decoder().clone(), layer.context().clone());
        let initial = analysis.initial_state();
        let result = layer
            .create_forward(analysis)
            .max_iterations(max_iterations)
            .widening(widening)
            .run(initial);
        Self { result }
    }

    pub fn analysis(&self) -> &ValueAnalysis {
        self.result.analysis()
    }

    /// State before the operation at `apc`.
    pub fn state(&self, apc: &Apc) -> Option<ValueState> {
        self.result.state(apc)
    }

    /// State after the operation at `apc`, falling back to the state before
    /// it when the operation cannot complete normally.
    pub fn post_state(&self, apc: &Apc) -> Option<ValueState> {
        let pre = self.state(apc)?;
        let Some(op) = self.analysis().heap().decode(apc) else {
            return Some(pre);
        };
        match self.analysis().apply(&op, &pre) {
            ValueState::Bottom => Some(pre),
            post => Some(post),
        }
    }

    pub fn is_unreachable(&self, apc: &Apc) -> bool {
        self.state(apc).is_none_or(|s| s.is_bottom())
    }

    pub fn info(&self, apc: &Apc, v: SymbolicValue) -> Option<ValueInfo> {
        Some(self.state(apc)?.facts()?.info(v))
    }

    pub fn is_null(&self, apc: &Apc, v: SymbolicValue) -> ProofOutcome {
        self.info(apc, v)
            .map_or(ProofOutcome::Bottom, |i| i.nullness.is_null())
    }

    pub fn is_non_null(&self, apc: &Apc, v: SymbolicValue) -> ProofOutcome {
        self.info(apc, v)
            .map_or(ProofOutcome::Bottom, |i| i.nullness.is_non_null())
    }

    pub fn is_true(&self, apc: &Apc, predicate: &Predicate) -> ProofOutcome {
        let Some(ValueState::Reached(facts)) = self.state(apc) else {
            return ProofOutcome::Bottom;
        };
        match predicate {
            Predicate::IsNull(v) => facts.info(*v).nullness.is_null(),
            Predicate::IsNonNull(v) => facts.info(*v).nullness.is_non_null(),
            Predicate::Compare(op, left, Operand::Value(right)) => facts.decide(*op, *left, *right),
            Predicate::Compare(op, left, Operand::Constant(c)) => {
                let info = facts.info(*left);
                let by_nullness = match (op, *c) {
                    (CmpOp::Eq, 0) => info.nullness.is_null(),
                    (CmpOp::Ne, 0) => info.nullness.is_non_null(),
                    _ => ProofOutcome::Top,
                };
                if by_nullness != ProofOutcome::Top {
                    return by_nullness;
                }
                info.interval.compare(*op, &Interval::constant(*c))
            }
        }
    }

    pub fn divergence(&self) -> Option<&AnalysisDivergence> {
        self.result.divergence()
    }

    pub fn contract_error(&self) -> Option<&ContractResolutionError> {
        self.analysis().contract_error.as_ref()
    }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values")
            .field("method", &self.analysis().context.method())
            .field("iterations", &self.result.iterations())
            .finish_non_exhaustive()
    }
}
