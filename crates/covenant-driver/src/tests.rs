use std::sync::Arc;

use covenant_ir::{
    BoxedExpression, BuildError, CmpOp, ContractClause, FieldId, Instruction, Local, MethodBody,
    MethodDef, MethodId, Offset, Param, TypeId,
};
use covenant_layer::WideningStrategy;
use covenant_test_utils::{InMemoryContracts, InMemoryMetadata, call, contract_library};

use crate::*;

const FIELD: FieldId = FieldId::new(0);

fn method(params: &[&str], instructions: Vec<Instruction>) -> MethodDef {
    MethodDef::builder()
        .name("m")
        .is_static(true)
        .param_names(params.iter().map(|p| p.to_string()).collect())
        .body(
            MethodBody::builder()
                .instructions(instructions)
                .params(params.len() as u16)
                .locals(1)
                .new(),
        )
        .new()
}

fn deref_param() -> MethodDef {
    method(
        &["x"],
        vec![
            Instruction::LoadArg(Param::new(0)),
            Instruction::LoadField(FIELD),
            Instruction::Pop,
            Instruction::Return,
        ],
    )
}

fn counting_loop() -> MethodDef {
    method(
        &[],
        vec![
            Instruction::LoadLocal(Local::new(0)),
            Instruction::LoadConst(1),
            Instruction::Binary(covenant_ir::BinaryOp::Add),
            Instruction::StoreLocal(Local::new(0)),
            Instruction::Branch(Offset::new(0)),
        ],
    )
}

fn driver(
    metadata: InMemoryMetadata,
    contracts: InMemoryContracts,
    config: AnalysisConfig,
) -> BasicAnalysisDriver {
    let metadata = metadata.with_field(FIELD, "f", TypeId::new(0));
    BasicAnalysisDriver::builder()
        .metadata(Arc::new(metadata))
        .contracts(Arc::new(contracts))
        .config(config)
        .new()
}

fn single(def: MethodDef) -> BasicAnalysisDriver {
    driver(
        InMemoryMetadata::new().with_method(MethodId::new(0), def),
        InMemoryContracts::standard(),
        AnalysisConfig::default(),
    )
}

#[test]
fn test_config_defaults() {
    let config = AnalysisConfig::default();
    assert_eq!(config.max_iterations, 1000);
    assert_eq!(config.widening, WideningStrategy::Delayed(3));
    assert_eq!(config.max_backward_depth, 400);
    assert!(!config.debug);
}

#[test]
fn test_layers_are_built_once() {
    let basic = single(deref_param());
    let driver = basic.create_method_driver(MethodId::new(0)).unwrap();
    assert!(driver.analysis_layers().is_none());

    let first = driver.run_heap_and_expression_analyses().clone();
    let second = driver.run_heap_and_expression_analyses().clone();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first.values(), second.values()));
    assert!(Arc::ptr_eq(
        driver.contract_free_stack_layer(),
        driver.contract_free_stack_layer()
    ));
    assert!(Arc::ptr_eq(driver.contract_free_cfg(), driver.cfg()));
    assert!(Arc::ptr_eq(first.value_layer().cfg(), driver.cfg()));
    assert!(driver.warnings().is_empty());
}

#[test]
fn test_broken_method_is_skipped() {
    let broken = method(&[], vec![Instruction::Branch(Offset::new(7))]);
    let contracts = InMemoryContracts::standard();
    let basic = driver(
        InMemoryMetadata::new()
            .with_method(MethodId::new(0), broken)
            .with_method(MethodId::new(1), deref_param()),
        contracts,
        AnalysisConfig::default(),
    );
    let report = basic.run_batch([MethodId::new(0), MethodId::new(1), MethodId::new(2)]);

    assert_eq!(report.len(), 3);
    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 2);
    assert_eq!(
        skipped[0].kind,
        MethodErrorKind::Build(BuildError::BranchOutOfRange {
            offset: Offset::new(0),
            target: Offset::new(7),
        })
    );
    assert_eq!(
        skipped[1].kind,
        MethodErrorKind::Build(BuildError::MissingBody(MethodId::new(2)))
    );
    assert!(skipped.iter().all(|e| e.is_fatal()));
    assert!(report.get(MethodId::new(1)).unwrap().output().is_some());
}

#[test]
fn test_divergence_is_a_warning() {
    let basic = driver(
        InMemoryMetadata::new().with_method(MethodId::new(0), counting_loop()),
        InMemoryContracts::standard(),
        AnalysisConfig::builder()
            .max_iterations(3)
            .widening(WideningStrategy::Never)
            .build(),
    );
    let report = basic.run_batch([MethodId::new(0)]);
    let outcome = report.get(MethodId::new(0)).unwrap();
    assert!(!outcome.is_skipped());
    let warnings: Vec<_> = report.warnings().collect();
    assert!(!warnings.is_empty());
    assert!(
        warnings
            .iter()
            .all(|w| matches!(w.kind, MethodErrorKind::Divergence(_)) && !w.is_fatal())
    );
}

#[test]
fn test_unresolvable_contract_is_a_warning() {
    let basic = driver(
        InMemoryMetadata::new().with_method(MethodId::new(0), deref_param()),
        InMemoryContracts::standard().with_unresolvable(MethodId::new(0)),
        AnalysisConfig::default(),
    );
    let report = InferenceDriver::new(basic).run_batch([MethodId::new(0)]);
    let warnings: Vec<_> = report.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(warnings[0].kind, MethodErrorKind::Contract(_)));
    // Analyzed as if it had no contract.
    let inferred = report.get(MethodId::new(0)).unwrap().output().unwrap();
    assert_eq!(inferred.preconditions, [BoxedExpression::variable("x").not_null()]);
}

#[test]
fn test_inference_respects_declared_contracts() {
    let checked = method(
        &["x"],
        vec![
            Instruction::LoadArg(Param::new(0)),
            Instruction::LoadNull,
            Instruction::Compare(CmpOp::Ne),
            call(contract_library::REQUIRES, 1),
            Instruction::LoadArg(Param::new(0)),
            Instruction::LoadField(FIELD),
            Instruction::Pop,
            Instruction::Return,
        ],
    );
    let contracts = InMemoryContracts::standard().with_clause(
        MethodId::new(0),
        ContractClause::requires(BoxedExpression::variable("x").not_null()),
    );
    let basic = driver(
        InMemoryMetadata::new().with_method(MethodId::new(0), checked),
        contracts,
        AnalysisConfig::default(),
    );
    let report = InferenceDriver::new(basic).run_batch([MethodId::new(0)]);
    let inferred = report.get(MethodId::new(0)).unwrap().output().unwrap();
    assert!(inferred.is_empty());
}

#[test]
fn test_inferred_contracts_display() {
    let contracts = InferredContracts {
        preconditions: vec![BoxedExpression::variable("x").not_null()],
        postconditions: vec![BoxedExpression::Result.not_null()],
        object_invariants: Vec::new(),
    };
    assert_eq!(
        contracts.to_string(),
        "requires x != null\nensures result != null\n"
    );
}
