use std::sync::Arc;

use covenant_ir::{
    Apc, BinaryOp, BoxedExpression, Cfg, CmpOp, ContractClause, Context, FieldId, Instruction,
    Local, MethodBody, MethodDef, MethodId, Offset, Param, ProofOutcome, TypeId,
};
use covenant_layer::{
    CodeLayer, ContractFreeView, Decoder, MethodContext, RawDecoder, Slot, StackDecoder,
    WideningStrategy,
};
use covenant_test_utils::{
    InMemoryContracts, InMemoryMetadata, at, call, call_value, contract_library,
};

use crate::*;

const METHOD: MethodId = MethodId::new(0);
const CTOR: MethodId = MethodId::new(5);
const USE: MethodId = MethodId::new(9);
const FACTORY: MethodId = MethodId::new(11);
const FIELD: FieldId = FieldId::new(0);

struct Analyzed {
    context: Arc<MethodContext>,
    heap: Arc<HeapDecoder>,
    values: Arc<Values>,
}

impl Analyzed {
    fn cfg(&self) -> &Arc<Cfg> {
        self.context.cfg()
    }

    fn facts(&self) -> FactBase {
        FactBase::new(self.heap.clone(), self.values.clone())
    }

    fn inference(&self) -> ContractInference {
        ContractInference::new(self.facts())
    }

    /// Point at `offset` in the root context.
    fn point(&self, offset: u32) -> Apc {
        let cfg = self.cfg();
        let (block, index) = cfg
            .blocks()
            .find_map(|b| (0..b.len()).find(|i| b.offset(*i) == Some(at(offset))).map(|i| (b.id, i)))
            .unwrap();
        Apc::new(block, index, Context::root())
    }

    fn param(&self, index: u16) -> SymbolicValue {
        self.heap.entry_value(Slot::Param(Param::new(index))).unwrap()
    }

    /// Value defined by the first operation, for queries whose answer does
    /// not depend on the value.
    fn first_def(&self) -> SymbolicValue {
        let op = self.heap.decode(&self.cfg().entry_point()).unwrap();
        *op.dest().unwrap()
    }
}

fn analyze_with(def: MethodDef, contracts: InMemoryContracts) -> Analyzed {
    let metadata = InMemoryMetadata::new()
        .with_method(METHOD, def)
        .with_field(FIELD, "f", TypeId::new(0));
    let cfg = Cfg::build(METHOD, &metadata).unwrap();
    let context = Arc::new(MethodContext::new(
        Arc::new(cfg),
        Arc::new(metadata),
        Arc::new(contracts),
    ));
    let raw = Arc::new(RawDecoder::new(context.cfg().clone()));
    let stack = Arc::new(StackDecoder::new(raw).unwrap());
    let free = ContractFreeView::new(stack, Arc::new(InMemoryContracts::standard()));
    let free = CodeLayer::new("contract-free", Arc::new(free), context.clone());
    let heap = Arc::new(HeapDecoder::analyze(&free, 1000, WideningStrategy::default()));
    let value_layer = CodeLayer::new("value", heap.clone(), context.clone());
    let values = Arc::new(Values::analyze(&value_layer, 1000, WideningStrategy::default()));
    Analyzed {
        context,
        heap,
        values,
    }
}

fn analyze(def: MethodDef) -> Analyzed {
    analyze_with(def, InMemoryContracts::standard())
}

fn static_method(params: &[&str], body: MethodBody) -> MethodDef {
    MethodDef::builder()
        .name("m")
        .is_static(true)
        .param_names(params.iter().map(|p| p.to_string()).collect())
        .body(body)
        .new()
}

fn body(instructions: Vec<Instruction>, params: u16, returns_value: bool) -> MethodBody {
    MethodBody::builder()
        .instructions(instructions)
        .params(params)
        .returns_value(returns_value)
        .new()
}

/// `if (x == null) return; use(x);`
fn null_guard() -> MethodDef {
    static_method(
        &["x"],
        body(
            vec![
                Instruction::LoadArg(Param::new(0)),
                Instruction::LoadNull,
                Instruction::Compare(CmpOp::Eq),
                Instruction::BranchFalse(Offset::new(5)),
                Instruction::Return,
                Instruction::LoadArg(Param::new(0)),
                call(USE, 1),
                Instruction::Return,
            ],
            1,
            false,
        ),
    )
}

#[test]
fn test_allocation_is_non_null_at_exit() {
    let a = analyze(static_method(
        &[],
        MethodBody::builder()
            .instructions(vec![
                Instruction::NewObj { ctor: CTOR, args: 0 },
                Instruction::StoreLocal(Local::new(0)),
                Instruction::LoadLocal(Local::new(0)),
                Instruction::LoadField(FIELD),
                Instruction::Pop,
                Instruction::LoadLocal(Local::new(0)),
                Instruction::Return,
            ])
            .locals(1)
            .returns_value(true)
            .new(),
    ));
    let exit = a.cfg().exit_point();
    let result = a.facts().value_of(&exit, Slot::Result).unwrap();
    assert_eq!(a.facts().is_non_null(&exit, result), ProofOutcome::True);
    let post: Vec<String> = a.inference().postconditions().map(|c| c.to_string()).collect();
    assert_eq!(post, ["result != null"]);
}

#[test]
fn test_null_check_refines_both_paths() {
    let a = analyze(null_guard());
    let x = a.param(0);
    let facts = a.facts();
    assert_eq!(facts.is_null(&a.point(4), x), ProofOutcome::True);
    assert_eq!(facts.is_non_null(&a.point(6), x), ProofOutcome::True);
    assert_eq!(facts.is_non_null(&a.point(0), x), ProofOutcome::Top);
    assert_eq!(
        facts.is_true(
            &a.point(6),
            &Predicate::Compare(CmpOp::Ne, x, Operand::Constant(0))
        ),
        ProofOutcome::True
    );
    assert!(a.inference().preconditions().next().is_none());
}

#[test]
fn test_code_after_throw_is_unreachable() {
    let a = analyze(static_method(
        &[],
        body(
            vec![
                Instruction::NewObj { ctor: CTOR, args: 0 },
                Instruction::Throw,
                Instruction::LoadNull,
                Instruction::Return,
            ],
            0,
            true,
        ),
    ));
    let facts = a.facts();
    assert!(!facts.is_unreachable(&a.cfg().entry_point()));
    for offset in [2, 3] {
        let apc = a.point(offset);
        assert!(facts.is_unreachable(&apc));
        assert_eq!(
            facts.is_true(&apc, &Predicate::IsNull(a.first_def())),
            ProofOutcome::Bottom
        );
    }
    assert!(facts.is_unreachable(&a.cfg().exit_point()));
    assert!(a.inference().postconditions().next().is_none());
}

#[test]
fn test_loop_counter_widens_and_exit_refines() {
    // i = 0; do { i = i + 1; } while (i < 10); return i;
    let a = analyze(static_method(
        &[],
        MethodBody::builder()
            .instructions(vec![
                Instruction::LoadLocal(Local::new(0)),
                Instruction::LoadConst(1),
                Instruction::Binary(BinaryOp::Add),
                Instruction::StoreLocal(Local::new(0)),
                Instruction::LoadLocal(Local::new(0)),
                Instruction::LoadConst(10),
                Instruction::Compare(CmpOp::Lt),
                Instruction::BranchTrue(Offset::new(0)),
                Instruction::LoadLocal(Local::new(0)),
                Instruction::Return,
            ])
            .locals(1)
            .returns_value(true)
            .new(),
    ));
    assert!(a.values.divergence().is_none());
    let after = a.point(8);
    let i = a.facts().value_of(&after, Slot::Local(Local::new(0))).unwrap();
    let info = a.values.info(&after, i).unwrap();
    assert_eq!(info.interval.to_string(), "[10, +inf]");
    assert_eq!(
        a.facts().is_true(&after, &Predicate::Compare(CmpOp::Ge, i, Operand::Constant(10))),
        ProofOutcome::True
    );
}

#[test]
fn test_value_budget_reports_divergence() {
    let def = static_method(
        &[],
        MethodBody::builder()
            .instructions(vec![
                Instruction::LoadLocal(Local::new(0)),
                Instruction::LoadConst(1),
                Instruction::Binary(BinaryOp::Add),
                Instruction::StoreLocal(Local::new(0)),
                Instruction::Branch(Offset::new(0)),
            ])
            .locals(1)
            .new(),
    );
    let metadata = InMemoryMetadata::new().with_method(METHOD, def);
    let cfg = Arc::new(Cfg::build(METHOD, &metadata).unwrap());
    let context = Arc::new(MethodContext::new(
        cfg.clone(),
        Arc::new(metadata),
        Arc::new(InMemoryContracts::standard()),
    ));
    let raw = Arc::new(RawDecoder::new(cfg.clone()));
    let stack = CodeLayer::new(
        "stack",
        Arc::new(StackDecoder::new(raw).unwrap()),
        context.clone(),
    );
    let heap = Arc::new(HeapDecoder::analyze(&stack, 1000, WideningStrategy::default()));
    let layer = CodeLayer::new("value", heap, context);
    let values = Values::analyze(&layer, 3, WideningStrategy::Never);

    let divergence = values.divergence().unwrap();
    assert_eq!(divergence.budget, 3);
    assert_eq!(
        values.state(&cfg.entry_point()),
        Some(ValueState::Reached(ValueFacts::default()))
    );
}

#[test]
fn test_declared_precondition_seeds_entry() {
    let contracts = InMemoryContracts::standard().with_clause(
        METHOD,
        ContractClause::requires(BoxedExpression::variable("x").not_null()),
    );
    let a = analyze_with(
        static_method(
            &["x"],
            body(
                vec![
                    Instruction::LoadArg(Param::new(0)),
                    Instruction::LoadField(FIELD),
                    Instruction::Pop,
                    Instruction::Return,
                ],
                1,
                false,
            ),
        ),
        contracts,
    );
    let entry = a.cfg().entry_point();
    assert_eq!(a.facts().is_non_null(&entry, a.param(0)), ProofOutcome::True);
    assert!(a.values.contract_error().is_none());
    assert!(a.inference().preconditions().next().is_none());
}

#[test]
fn test_unresolvable_contract_is_ignored() {
    let a = analyze_with(null_guard(), InMemoryContracts::standard().with_unresolvable(METHOD));
    assert!(a.values.contract_error().is_some());
    let entry = a.cfg().entry_point();
    assert_eq!(a.facts().is_non_null(&entry, a.param(0)), ProofOutcome::Top);
    assert_eq!(a.facts().is_non_null(&a.point(6), a.param(0)), ProofOutcome::True);
}

/// `return factory() != null ? 1 : 0;`
fn branch_on_factory() -> MethodDef {
    static_method(
        &[],
        body(
            vec![
                call_value(FACTORY, 0),
                Instruction::BranchTrue(Offset::new(4)),
                Instruction::LoadConst(0),
                Instruction::Return,
                Instruction::LoadConst(1),
                Instruction::Return,
            ],
            0,
            true,
        ),
    )
}

#[test]
fn test_callee_postcondition_holds_after_call() {
    let contracts = InMemoryContracts::standard()
        .with_clause(FACTORY, ContractClause::ensures(BoxedExpression::Result.not_null()));
    let a = analyze_with(branch_on_factory(), contracts);
    assert!(a.facts().is_unreachable(&a.point(2)));
    assert!(!a.facts().is_unreachable(&a.point(4)));

    let a = analyze(branch_on_factory());
    assert!(!a.facts().is_unreachable(&a.point(2)));
    assert!(!a.facts().is_unreachable(&a.point(4)));
}

#[test]
fn test_callee_postcondition_bounds_result() {
    // if (factory() < 0) return 1; return 0;
    let def = static_method(
        &[],
        body(
            vec![
                call_value(FACTORY, 0),
                Instruction::LoadConst(0),
                Instruction::Compare(CmpOp::Lt),
                Instruction::BranchTrue(Offset::new(6)),
                Instruction::LoadConst(0),
                Instruction::Return,
                Instruction::LoadConst(1),
                Instruction::Return,
            ],
            0,
            true,
        ),
    );
    let ensures = BoxedExpression::compare(
        CmpOp::Ge,
        BoxedExpression::Result,
        BoxedExpression::Constant(0),
    );
    let contracts =
        InMemoryContracts::standard().with_clause(FACTORY, ContractClause::ensures(ensures));
    let a = analyze_with(def, contracts);
    assert!(a.facts().is_unreachable(&a.point(6)));
    assert!(!a.facts().is_unreachable(&a.point(4)));
}

#[test]
fn test_unresolvable_callee_contract_assumes_nothing() {
    let contracts = InMemoryContracts::standard().with_unresolvable(FACTORY);
    let a = analyze_with(branch_on_factory(), contracts);
    assert!(a.values.contract_error().is_none());
    assert!(!a.facts().is_unreachable(&a.point(2)));
}

#[test]
fn test_contract_calls_do_not_reach_the_value_layer() {
    let a = analyze(static_method(
        &["x"],
        body(
            vec![
                Instruction::LoadArg(Param::new(0)),
                Instruction::LoadNull,
                Instruction::Compare(CmpOp::Ne),
                call(contract_library::REQUIRES, 1),
                Instruction::Return,
            ],
            1,
            false,
        ),
    ));
    let op = a.heap.decode(&a.point(3)).unwrap();
    assert!(matches!(op, covenant_layer::Operation::Pop { .. }));
}

#[test]
fn test_unchecked_dereference_infers_precondition() {
    let a = analyze(static_method(
        &["x"],
        body(
            vec![
                Instruction::LoadArg(Param::new(0)),
                Instruction::LoadField(FIELD),
                Instruction::Pop,
                Instruction::Return,
            ],
            1,
            false,
        ),
    ));
    let pre: Vec<String> = a.inference().preconditions().map(|c| c.to_string()).collect();
    assert_eq!(pre, ["x != null"]);
    // The dereference itself proves the parameter non-null afterwards.
    assert_eq!(a.facts().is_non_null(&a.point(2), a.param(0)), ProofOutcome::True);
}

#[test]
fn test_conditional_dereference_infers_nothing() {
    let a = analyze(static_method(
        &["x", "flag"],
        body(
            vec![
                Instruction::LoadArg(Param::new(1)),
                Instruction::BranchFalse(Offset::new(5)),
                Instruction::LoadArg(Param::new(0)),
                Instruction::LoadField(FIELD),
                Instruction::Pop,
                Instruction::Return,
            ],
            2,
            false,
        ),
    ));
    assert!(a.inference().preconditions().next().is_none());
}

#[test]
fn test_constant_and_null_results() {
    let constant = analyze(static_method(
        &[],
        body(vec![Instruction::LoadConst(5), Instruction::Return], 0, true),
    ));
    let post: Vec<String> = constant
        .inference()
        .postconditions()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(post, ["result == 5"]);

    let null = analyze(static_method(
        &[],
        body(vec![Instruction::LoadNull, Instruction::Return], 0, true),
    ));
    let post: Vec<String> = null.inference().postconditions().map(|c| c.to_string()).collect();
    assert_eq!(post, ["result == null"]);
}

#[test]
fn test_constructor_field_invariant() {
    let def = MethodDef::builder()
        .name(".ctor")
        .is_constructor(true)
        .param_names(vec!["this".to_string()])
        .body(body(
            vec![
                Instruction::LoadArg(Param::new(0)),
                Instruction::NewObj { ctor: CTOR, args: 0 },
                Instruction::StoreField(FIELD),
                Instruction::Return,
            ],
            1,
            false,
        ))
        .new();
    let a = analyze(def);
    let invariants: Vec<String> = a
        .inference()
        .object_invariants()
        .map(|c| c.to_string())
        .collect();
    assert_eq!(invariants, ["this.f != null"]);
    // The receiver of an instance method is never null.
    let entry = a.cfg().entry_point();
    assert_eq!(a.facts().is_non_null(&entry, a.param(0)), ProofOutcome::True);
}

#[test]
fn test_expressions_are_rebuilt_from_facts() {
    let a = analyze(static_method(
        &["x"],
        body(
            vec![
                Instruction::LoadArg(Param::new(0)),
                Instruction::LoadField(FIELD),
                Instruction::LoadConst(1),
                Instruction::Binary(BinaryOp::Add),
                Instruction::Return,
            ],
            1,
            true,
        ),
    ));
    let ret = a.point(4);
    let sum = a.facts().value_of(&ret, Slot::Stack(0)).unwrap();
    let hybrid = HybridDecoder::new(a.values.clone());
    assert_eq!(hybrid.expression(&ret, &sum).unwrap().to_string(), "(x.f + 1)");

    let labeled = ExpressionDecoder::new(a.values.clone());
    let add = a.point(3);
    let op = labeled.decode(&add).unwrap();
    let dest = op.dest().unwrap().clone();
    assert_eq!(dest.apc, add);
    // The sum is not defined yet before the addition runs.
    assert!(labeled.expression(&add, &dest).is_none());
    let field = LabeledSymbol {
        apc: add.clone(),
        value: op.reads()[0].value,
    };
    assert_eq!(labeled.expression(&add, &field).unwrap().to_string(), "x.f");
}
