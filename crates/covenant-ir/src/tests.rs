use std::sync::Arc;

use crate::*;

fn off(raw: u32) -> Offset {
    Offset::new(raw)
}

fn cfg_of(body: MethodBody) -> Result<Cfg, BuildError> {
    Cfg::from_body(MethodId::new(0), Arc::new(body))
}

fn kinds_from(cfg: &Cfg, block: BlockId) -> Vec<EdgeKind> {
    cfg.successor_edges(block).map(|e| e.kind.clone()).collect()
}

/// `if (arg0 == null) return 0; return 1;`
fn branch_body() -> MethodBody {
    MethodBody::builder()
        .instructions(vec![
            Instruction::LoadArg(Param::new(0)),
            Instruction::BranchTrue(off(4)),
            Instruction::LoadConst(0),
            Instruction::Return,
            Instruction::LoadConst(1),
            Instruction::Return,
        ])
        .params(1)
        .returns_value(true)
        .new()
}

/// ```text
/// 0: call M1      try {
/// 1: leave 5      }
/// 2: call M2      finally {
/// 3: endfinally   }
/// 4: nop
/// 5: ret
/// ```
fn try_finally_body() -> MethodBody {
    MethodBody::builder()
        .instructions(vec![
            Instruction::Call {
                method: MethodId::new(1),
                args: 0,
                returns: false,
            },
            Instruction::Leave(off(5)),
            Instruction::Call {
                method: MethodId::new(2),
                args: 0,
                returns: false,
            },
            Instruction::EndFinally,
            Instruction::Nop,
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(0..2, 2..4, HandlerKind::Finally)])
        .new()
}

#[test]
fn test_blocks_split_at_targets_and_terminators() {
    let cfg = cfg_of(branch_body()).unwrap();
    let starts: Vec<_> = cfg
        .blocks()
        .filter_map(|b| match b.kind {
            BlockKind::Code { start, .. } => Some(start.raw()),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0, 2, 4]);
    assert_eq!(
        kinds_from(&cfg, cfg.entry()),
        vec![EdgeKind::True, EdgeKind::False]
    );
}

#[test]
fn test_edges_are_mirrored_in_predecessors() {
    let cfg = cfg_of(try_finally_body()).unwrap();
    for block in cfg.blocks() {
        for edge in cfg.successor_edges(block.id) {
            assert!(cfg.predecessor_edges(edge.to).any(|e| e == edge));
        }
        for edge in cfg.predecessor_edges(block.id) {
            assert!(cfg.successor_edges(edge.from).any(|e| e == edge));
        }
    }
}

#[test]
fn test_every_return_reaches_exit() {
    let cfg = cfg_of(branch_body()).unwrap();
    let returns = cfg
        .predecessor_edges(cfg.exit())
        .filter(|e| e.kind == EdgeKind::Return)
        .count();
    assert_eq!(returns, 2);
}

#[test]
fn test_empty_body_is_rejected() {
    let body = MethodBody::builder().instructions(vec![]).new();
    assert_eq!(cfg_of(body).unwrap_err(), BuildError::EmptyBody);
}

#[test]
fn test_branch_out_of_range_is_rejected() {
    let body = MethodBody::builder()
        .instructions(vec![Instruction::Branch(off(7)), Instruction::Return])
        .new();
    assert_eq!(
        cfg_of(body).unwrap_err(),
        BuildError::BranchOutOfRange {
            offset: off(0),
            target: off(7),
        }
    );
}

#[test]
fn test_falling_off_the_end_is_rejected() {
    let body = MethodBody::builder()
        .instructions(vec![Instruction::Nop, Instruction::LoadConst(1)])
        .new();
    assert_eq!(
        cfg_of(body).unwrap_err(),
        BuildError::FallsOffEnd { offset: off(1) }
    );
}

#[test]
fn test_overlapping_regions_are_rejected() {
    let mut body = try_finally_body();
    body.regions
        .push(ExceptionRegion::new(1..3, 4..5, HandlerKind::Fault));
    assert_eq!(
        cfg_of(body).unwrap_err(),
        BuildError::UnbalancedRegion { region: 1 }
    );
}

#[test]
fn test_missing_body_is_reported() {
    struct NoBodies;
    impl MetadataProvider for NoBodies {
        fn method(&self, _: MethodId) -> Option<&MethodDef> {
            None
        }
        fn field(&self, _: FieldId) -> Option<&FieldDef> {
            None
        }
        fn type_name(&self, _: TypeId) -> Option<&str> {
            None
        }
    }
    let err = SubroutineFacade.build(MethodId::new(9), &NoBodies).unwrap_err();
    assert_eq!(err, BuildError::MissingBody(MethodId::new(9)));
}

#[test]
fn test_finally_is_a_subroutine_entered_by_leave() {
    let cfg = cfg_of(try_finally_body()).unwrap();
    assert_eq!(cfg.subroutines().len(), 1);
    let finally = cfg.subroutine(SubroutineId::new(0));
    assert_eq!(finally.parent, None);
    assert_eq!(finally.propagation.as_slice(), &[Propagation::Unwind]);
    assert_eq!(cfg.block(finally.entry).owner, Some(finally.id));

    let kinds = kinds_from(&cfg, cfg.entry());
    assert!(kinds.iter().any(|k| matches!(k, EdgeKind::Leave { .. })));
    assert!(kinds.contains(&EdgeKind::Handler(finally.id)));
}

#[test]
fn test_endfinally_follows_the_pending_leave() {
    let cfg = cfg_of(try_finally_body()).unwrap();
    let entry = cfg.entry_point();
    let last = Apc::new(entry.block, 1, Context::root());
    let into_finally: Vec<_> = cfg
        .successors(&last)
        .into_iter()
        .filter(|s| matches!(s.kind, EdgeKind::Leave { .. }))
        .collect();
    assert_eq!(into_finally.len(), 1);
    let in_finally = &into_finally[0].apc;
    assert_eq!(in_finally.context.depth(), 1);

    let end = Apc::new(in_finally.block, 1, in_finally.context.clone());
    let after: Vec<_> = cfg.successors(&end).into_iter().collect();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].kind, EdgeKind::SubroutineReturn);
    assert_eq!(Some(after[0].apc.block), cfg.block_starting_at(off(5)));
    assert!(after[0].apc.context.is_root());
}

#[test]
fn test_endfinally_during_propagation_unwinds() {
    let cfg = cfg_of(try_finally_body()).unwrap();
    let throwing = Apc::new(cfg.entry(), 0, Context::root());
    let handler = cfg
        .successors(&throwing)
        .into_iter()
        .find(|s| matches!(s.kind, EdgeKind::Handler(_)))
        .unwrap();
    assert_eq!(
        handler.apc.context.top().map(|f| &f.resume),
        Some(&Resume::Propagate)
    );
    let end = Apc::new(handler.apc.block, 1, handler.apc.context.clone());
    let after: Vec<_> = cfg.successors(&end).into_iter().collect();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].apc, cfg.exception_exit_point());
}

#[test]
fn test_leave_through_two_finallies_chains_them() {
    // try { try { leave 8 } finally { endfinally } } finally { endfinally }
    let body = MethodBody::builder()
        .instructions(vec![
            Instruction::Nop,
            Instruction::Leave(off(8)),
            Instruction::Nop,
            Instruction::EndFinally,
            Instruction::Leave(off(8)),
            Instruction::Nop,
            Instruction::EndFinally,
            Instruction::Nop,
            Instruction::Return,
        ])
        .regions(vec![
            ExceptionRegion::new(0..2, 2..4, HandlerKind::Finally),
            ExceptionRegion::new(0..5, 5..7, HandlerKind::Finally),
        ])
        .new();
    let cfg = cfg_of(body).unwrap();
    let inner = cfg.subroutine(SubroutineId::new(0));
    let outer = cfg.subroutine(SubroutineId::new(1));
    assert_eq!(
        inner.propagation.as_slice(),
        &[Propagation::Handler(outer.id)]
    );

    let leave = Apc::new(cfg.entry(), 1, Context::root());
    let first = cfg
        .successors(&leave)
        .into_iter()
        .find(|s| matches!(s.kind, EdgeKind::Leave { .. }))
        .unwrap();
    assert_eq!(first.apc.block, inner.entry);

    let inner_end = Apc::new(inner.entry, 1, first.apc.context.clone());
    let second = cfg.successors(&inner_end);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].apc.block, outer.entry);
    assert_eq!(second[0].apc.context.depth(), 1);

    let outer_end = Apc::new(outer.entry, 1, second[0].apc.context.clone());
    let done = cfg.successors(&outer_end);
    assert_eq!(done.len(), 1);
    assert_eq!(Some(done[0].apc.block), cfg.block_starting_at(off(8)));
}

#[test]
fn test_catch_handler_stops_propagation() {
    // try { call } catch { pop; leave 4 } ret
    let body = MethodBody::builder()
        .instructions(vec![
            Instruction::Call {
                method: MethodId::new(1),
                args: 0,
                returns: false,
            },
            Instruction::Leave(off(4)),
            Instruction::Pop,
            Instruction::Leave(off(4)),
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(
            0..2,
            2..4,
            HandlerKind::Catch(None),
        )])
        .new();
    let cfg = cfg_of(body).unwrap();
    let kinds = kinds_from(&cfg, cfg.entry());
    assert!(kinds.contains(&EdgeKind::Handler(SubroutineId::new(0))));
    assert!(!kinds.contains(&EdgeKind::Unwind));
}

/// ```text
/// 0: call M1      try {
/// 1: ldc 1
/// 2: stloc 0
/// 3: leave 9      }
/// 4: pop          catch {
/// 5: ldloc 0
/// 6: brtrue 8
/// 7: leave 9
/// 8: leave 9      }
/// 9: ret
/// ```
fn call_then_store_body() -> MethodBody {
    MethodBody::builder()
        .instructions(vec![
            Instruction::Call {
                method: MethodId::new(1),
                args: 0,
                returns: false,
            },
            Instruction::LoadConst(1),
            Instruction::StoreLocal(Local::new(0)),
            Instruction::Leave(off(9)),
            Instruction::Pop,
            Instruction::LoadLocal(Local::new(0)),
            Instruction::BranchTrue(off(8)),
            Instruction::Leave(off(9)),
            Instruction::Leave(off(9)),
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(
            0..4,
            4..9,
            HandlerKind::Catch(None),
        )])
        .locals(1)
        .new()
}

#[test]
fn test_handler_is_entered_from_the_raising_instruction() {
    let cfg = cfg_of(call_then_store_body()).unwrap();
    let catch = cfg.subroutine(SubroutineId::new(0));
    let enters_handler = |index: u32| {
        let apc = Apc::new(cfg.entry(), index, Context::root());
        cfg.successors(&apc)
            .into_iter()
            .filter(|s| s.is_exceptional())
            .map(|s| s.apc.block)
            .collect::<Vec<_>>()
    };
    assert_eq!(enters_handler(0), vec![catch.entry]);
    for index in 1..4 {
        assert_eq!(enters_handler(index), Vec::<BlockId>::new(), "index {index}");
    }
}

#[test]
fn test_context_push_and_pop_share_tails() {
    let frame = |raw| Frame {
        subroutine: SubroutineId::new(raw),
        resume: Resume::Propagate,
    };
    let one = Context::root().push(frame(0));
    let two = one.push(frame(1));
    assert_eq!(two.depth(), 2);
    assert_eq!(two.pop(), one);
    assert_eq!(
        two.frames().map(|f| f.subroutine.raw()).collect::<Vec<_>>(),
        vec![1, 0]
    );
    assert_eq!(two.to_string(), "S0/S1");
    assert!(Context::root().pop().is_root());
}

#[test]
fn test_post_dominators_follow_normal_flow() {
    let cfg = cfg_of(branch_body()).unwrap();
    let then_block = cfg.block_starting_at(off(4)).unwrap();
    let pd = cfg.post_dominators();
    assert!(pd.post_dominates(cfg.exit(), cfg.entry()));
    assert!(!pd.post_dominates(then_block, cfg.entry()));
}

#[test]
fn test_loop_header_is_a_back_edge_target() {
    // 0: ldarg 0; 1: brtrue 0; 2: ret
    let body = MethodBody::builder()
        .instructions(vec![
            Instruction::LoadArg(Param::new(0)),
            Instruction::BranchTrue(off(0)),
            Instruction::Return,
        ])
        .params(1)
        .new();
    let cfg = cfg_of(body).unwrap();
    let targets = cfg.back_edge_targets();
    assert!(targets.contains(&cfg.entry()));
    assert_eq!(targets.len(), 1);
}

#[test]
fn test_retry_through_catch_is_a_loop() {
    // try { call } catch { pop; leave 0 } ret
    let body = MethodBody::builder()
        .instructions(vec![
            Instruction::Call {
                method: MethodId::new(1),
                args: 0,
                returns: false,
            },
            Instruction::Leave(off(4)),
            Instruction::Pop,
            Instruction::Leave(off(0)),
            Instruction::Return,
        ])
        .regions(vec![ExceptionRegion::new(
            0..2,
            2..4,
            HandlerKind::Catch(None),
        )])
        .new();
    let cfg = cfg_of(body).unwrap();
    let targets = cfg.back_edge_targets();
    assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![cfg.entry()]);
}

#[test]
fn test_proof_outcome_lattice() {
    use ProofOutcome::*;
    assert_eq!(True.join(&False), Top);
    assert_eq!(True.meet(&False), Bottom);
    assert_eq!(Bottom.join(&True), True);
    assert!(Bottom.is_subseteq(&False));
    assert_eq!(True.negate(), False);
    assert_eq!(Top.negate(), Top);
}

#[test]
fn test_null_check_expressions() {
    let e = BoxedExpression::variable("x").not_null();
    assert_eq!(e.to_string(), "x != null");
    assert_eq!(
        e.as_null_check(),
        Some((&BoxedExpression::variable("x"), true))
    );
    let r = BoxedExpression::Result.is_null();
    assert_eq!(r.as_null_check(), Some((&BoxedExpression::Result, false)));
    let f = BoxedExpression::variable("this").field("name");
    assert_eq!(f.to_string(), "this.name");
    assert_eq!(f.as_null_check(), None);
    assert_eq!(f.not_null().as_null_check(), None);
}
