use std::sync::Arc;

use covenant::prelude::*;
use covenant_test_utils::{InMemoryContracts, InMemoryMetadata, call};

const NULL_GUARD: MethodId = MethodId::new(1);
const ALLOCATE: MethodId = MethodId::new(2);
const THROWS: MethodId = MethodId::new(3);
const BROKEN: MethodId = MethodId::new(4);
const SPIN: MethodId = MethodId::new(5);
const TRY_FINALLY: MethodId = MethodId::new(6);
const CATCH_AFTER_CALL: MethodId = MethodId::new(7);
const CTOR: MethodId = MethodId::new(20);
const USE: MethodId = MethodId::new(21);
const FIELD: FieldId = FieldId::new(0);

fn static_method(params: &[&str], body: MethodBody) -> MethodDef {
    MethodDef::builder()
        .name("m")
        .is_static(true)
        .param_names(params.iter().map(|p| p.to_string()).collect())
        .body(body)
        .new()
}

fn metadata() -> InMemoryMetadata {
    // if (x == null) return; use(x);
    let null_guard = MethodBody::builder()
        .instructions(vec![
            Instruction::LoadArg(Param::new(0)),
            Instruction::LoadNull,
            Instruction::Compare(CmpOp::Eq),
            Instruction::BranchFalse(Offset::new(5)),
            Instruction::Return,
            Instruction::LoadArg(Param::new(0)),
            call(USE, 1),
            Instruction::Return,
        ])
        .params(1)
        .new();
    // var o = new C(); o.f; return o;
    let allocate = MethodBody::builder()
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
        .new();
    let throws = MethodBody::builder()
        .instructions(vec![
            Instruction::NewObj { ctor: CTOR, args: 0 },
            Instruction::Throw,
            Instruction::LoadArg(Param::new(0)),
            Instruction::LoadField(FIELD),
            Instruction::Pop,
            Instruction::Return,
        ])
        .params(1)
        .new();
    let broken = MethodBody::builder()
        .instructions(vec![
            Instruction::LoadConst(0),
            Instruction::BranchTrue(Offset::new(40)),
            Instruction::Return,
        ])
        .new();
    let spin = MethodBody::builder()
        .instructions(vec![
            Instruction::LoadLocal(Local::new(0)),
            Instruction::LoadConst(1),
            Instruction::Binary(BinaryOp::Add),
            Instruction::StoreLocal(Local::new(0)),
            Instruction::Branch(Offset::new(0)),
        ])
        .locals(1)
        .new();
    // try { use(); } finally { } return;
    let try_finally = MethodBody::builder()
        .instructions(vec![
            call(USE, 0),
            Instruction::Leave(Offset::new(3)),
            Instruction::EndFinally,
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(0..2, 2..3, HandlerKind::Finally)])
        .new();
    // var done = 0; try { use(); done = 1; } catch { if (done == 0) { } }
    let catch_after_call = MethodBody::builder()
        .instructions(vec![
            call(USE, 0),
            Instruction::LoadConst(1),
            Instruction::StoreLocal(Local::new(0)),
            Instruction::Leave(Offset::new(9)),
            Instruction::Pop,
            Instruction::LoadLocal(Local::new(0)),
            Instruction::BranchTrue(Offset::new(8)),
            Instruction::Leave(Offset::new(9)),
            Instruction::Leave(Offset::new(9)),
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(0..4, 4..9, HandlerKind::Catch(None))])
        .locals(1)
        .new();

    InMemoryMetadata::new()
        .with_method(NULL_GUARD, static_method(&["x"], null_guard))
        .with_method(ALLOCATE, static_method(&[], allocate))
        .with_method(THROWS, static_method(&["x"], throws))
        .with_method(BROKEN, static_method(&[], broken))
        .with_method(SPIN, static_method(&[], spin))
        .with_method(TRY_FINALLY, static_method(&[], try_finally))
        .with_method(CATCH_AFTER_CALL, static_method(&[], catch_after_call))
        .with_field(FIELD, "f", TypeId::new(0))
}

fn basic(config: AnalysisConfig) -> BasicAnalysisDriver {
    BasicAnalysisDriver::builder()
        .metadata(Arc::new(metadata()))
        .contracts(Arc::new(InMemoryContracts::standard()))
        .config(config)
        .new()
}

fn point(driver: &BasicMethodDriver, offset: u32) -> Apc {
    driver
        .cfg()
        .blocks()
        .find_map(|b| {
            (0..b.len())
                .find(|i| b.offset(*i) == Some(Offset::new(offset)))
                .map(|i| Apc::new(b.id, i, Context::root()))
        })
        .unwrap()
}

#[test]
fn test_allocation_then_use_is_non_null() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(ALLOCATE)
        .unwrap();
    let facts = driver.fact_base();
    let exit = driver.cfg().exit_point();
    let result = facts.value_of(&exit, Slot::Result).unwrap();
    assert_eq!(facts.is_non_null(&exit, result), ProofOutcome::True);
    assert!(!facts.is_unreachable(&driver.cfg().entry_point()));
}

#[test]
fn test_null_guard_refines_both_branches() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(NULL_GUARD)
        .unwrap();
    let facts = driver.fact_base();
    let entry = driver.cfg().entry_point();
    let x = facts.value_of(&entry, Slot::Param(Param::new(0))).unwrap();

    let use_site = point(&driver, 6);
    assert_eq!(facts.value_of(&use_site, Slot::Param(Param::new(0))), Some(x));
    assert_eq!(facts.is_non_null(&use_site, x), ProofOutcome::True);
    assert_eq!(facts.is_true(&use_site, &Predicate::IsNull(x)), ProofOutcome::False);

    let early_return = point(&driver, 4);
    assert_eq!(facts.is_null(&early_return, x), ProofOutcome::True);
}

#[test]
fn test_code_after_throw_is_dead() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(THROWS)
        .unwrap();
    let facts = driver.fact_base();
    let x = facts
        .value_of(&driver.cfg().entry_point(), Slot::Param(Param::new(0)))
        .unwrap();
    for offset in 2..6 {
        let apc = point(&driver, offset);
        assert!(facts.is_unreachable(&apc), "IL_{offset} should be dead");
        assert_eq!(facts.is_non_null(&apc, x), ProofOutcome::Bottom);
    }
    assert!(facts.is_unreachable(&driver.cfg().exit_point()));
    assert!(!facts.is_unreachable(&driver.cfg().exception_exit_point()));
}

#[test]
fn test_batch_skips_malformed_methods() {
    let report = InferenceDriver::new(basic(AnalysisConfig::default())).run_batch([
        NULL_GUARD,
        BROKEN,
        ALLOCATE,
        THROWS,
    ]);
    let order: Vec<MethodId> = report.iter().map(|(m, _)| *m).collect();
    assert_eq!(order, [NULL_GUARD, BROKEN, ALLOCATE, THROWS]);

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].method, BROKEN);
    assert!(matches!(
        skipped[0].kind,
        MethodErrorKind::Build(BuildError::BranchOutOfRange { .. })
    ));

    let allocate = report.get(ALLOCATE).unwrap().output().unwrap();
    assert_eq!(allocate.postconditions, [BoxedExpression::Result.not_null()]);
    // The dereference after the throw never runs.
    let throws = report.get(THROWS).unwrap().output().unwrap();
    assert!(throws.preconditions.is_empty());
}

#[test]
fn test_rerunning_returns_the_same_layers() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(NULL_GUARD)
        .unwrap();
    let first = driver.run_heap_and_expression_analyses().clone();
    let second = driver.run_heap_and_expression_analyses().clone();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first.heap(), second.heap()));
    assert!(Arc::ptr_eq(first.expression_layer(), second.expression_layer()));
    assert!(Arc::ptr_eq(first.hybrid_layer(), second.hybrid_layer()));
}

#[test]
fn test_endless_loop_terminates() {
    let config = AnalysisConfig::builder()
        .max_iterations(4)
        .widening(WideningStrategy::Never)
        .build();
    let driver = basic(config).create_method_driver(SPIN).unwrap();
    let layers = driver.run_heap_and_expression_analyses();
    assert!(!layers.warnings().is_empty());
    assert!(
        layers
            .warnings()
            .iter()
            .all(|w| matches!(w.kind, MethodErrorKind::Divergence(_)))
    );
    let facts = layers.fact_base();
    assert!(!facts.is_unreachable(&driver.cfg().entry_point()));
}

#[test]
fn test_endless_loop_converges_with_widening() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(SPIN)
        .unwrap();
    assert!(driver.run_heap_and_expression_analyses().warnings().is_empty());
}

#[test]
fn test_finally_is_reached_from_both_exits() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(TRY_FINALLY)
        .unwrap();
    let facts = driver.fact_base();
    let finally = point(&driver, 2);
    assert!(!facts.is_unreachable(&finally));
    assert!(!facts.is_unreachable(&point(&driver, 3)));
    assert!(!facts.is_unreachable(&driver.cfg().exit_point()));
    assert!(!facts.is_unreachable(&driver.cfg().exception_exit_point()));
}

#[test]
fn test_catch_sees_state_of_the_raising_call() {
    let driver = basic(AnalysisConfig::default())
        .create_method_driver(CATCH_AFTER_CALL)
        .unwrap();
    let facts = driver.fact_base();
    let test = point(&driver, 6);
    assert!(!facts.is_unreachable(&test));
    let done = facts.value_of(&test, Slot::Local(Local::new(0))).unwrap();
    assert_eq!(facts.is_null(&test, done), ProofOutcome::True);
    assert!(!facts.is_unreachable(&point(&driver, 7)));
    assert!(facts.is_unreachable(&point(&driver, 8)));
    assert!(!facts.is_unreachable(&driver.cfg().exit_point()));
}

#[test]
fn test_threads_share_one_basic_driver() {
    let basic = basic(AnalysisConfig::default());
    let methods = [NULL_GUARD, ALLOCATE, THROWS, TRY_FINALLY];
    let inferred: Vec<InferredContracts> = std::thread::scope(|scope| {
        let handles: Vec<_> = methods
            .iter()
            .map(|&method| {
                let driver = InferenceDriver::new(basic.clone());
                scope.spawn(move || {
                    let method_driver = driver.create_method_driver(method).unwrap();
                    driver.analyze(&method_driver)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let sequential = InferenceDriver::new(basic).run_batch(methods);
    for (method, contracts) in methods.iter().zip(&inferred) {
        assert_eq!(sequential.get(*method).unwrap().output(), Some(contracts));
    }
}
