//! Infer contracts for a handful of small methods and print them.

use std::sync::Arc;

use covenant::prelude::*;
use covenant_test_utils::{InMemoryContracts, InMemoryMetadata};

const NODE_CTOR: MethodId = MethodId::new(10);
const NEXT: FieldId = FieldId::new(0);

fn main() {
    // int Length(Node n) { return n.next == null ? 1 : 2; }
    let length = MethodDef::builder()
        .name("Length")
        .is_static(true)
        .param_names(vec!["n".to_string()])
        .body(
            MethodBody::builder()
                .instructions(vec![
                    Instruction::LoadArg(Param::new(0)),
                    Instruction::LoadField(NEXT),
                    Instruction::BranchTrue(Offset::new(5)),
                    Instruction::LoadConst(1),
                    Instruction::Return,
                    Instruction::LoadConst(2),
                    Instruction::Return,
                ])
                .params(1)
                .returns_value(true)
                .new(),
        )
        .new();
    // Node() { this.next = new Node(); }
    let ctor = MethodDef::builder()
        .name(".ctor")
        .is_constructor(true)
        .param_names(vec!["this".to_string()])
        .body(
            MethodBody::builder()
                .instructions(vec![
                    Instruction::LoadArg(Param::new(0)),
                    Instruction::NewObj {
                        ctor: NODE_CTOR,
                        args: 0,
                    },
                    Instruction::StoreField(NEXT),
                    Instruction::Return,
                ])
                .params(1)
                .new(),
        )
        .new();

    let metadata = InMemoryMetadata::new()
        .with_method(MethodId::new(1), length)
        .with_method(NODE_CTOR, ctor)
        .with_field(NEXT, "next", TypeId::new(0));
    let methods = metadata.methods_with_bodies();
    let basic = BasicAnalysisDriver::builder()
        .metadata(Arc::new(metadata))
        .contracts(Arc::new(InMemoryContracts::standard()))
        .new();

    let report = InferenceDriver::new(basic).run_batch(methods);
    for (method, outcome) in report.iter() {
        match outcome {
            MethodOutcome::Analyzed { output, warnings } => {
                println!("{method}:");
                print!("{output}");
                for warning in warnings {
                    println!("  warning: {warning}");
                }
            }
            MethodOutcome::Skipped(err) => println!("{method}: skipped ({err})"),
        }
    }
}
