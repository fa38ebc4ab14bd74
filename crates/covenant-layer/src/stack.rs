use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use covenant_ir::{
    Apc, BlockId, BlockKind, BuildError, Cfg, EdgeKind, Instruction, Local, Offset, Param,
    StackEffect,
};

use crate::{Access, Decoder, Operation, RawDecoder, Source};

/// A named storage location: an evaluation-stack slot counted from the
/// bottom of the stack, a local, a parameter, or the method's return value.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    Stack(u16),
    Local(Local),
    Param(Param),
    /// Written by `ret` in analyses that track the returned value.
    Result,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Stack(i) => write!(f, "s{i}"),
            Slot::Local(l) => write!(f, "{l}"),
            Slot::Param(p) => write!(f, "{p}"),
            Slot::Result => write!(f, "result"),
        }
    }
}

/// Decodes with every stack operand named by its height.
///
/// Built from the raw decoder by one pass computing the stack height on
/// entry to each block.
#[derive(Debug)]
pub struct StackDecoder {
    raw: Arc<RawDecoder>,
    heights: Vec<Option<u16>>,
    operations: Vec<Operation<Slot>>,
}

impl StackDecoder {
    pub fn new(raw: Arc<RawDecoder>) -> Result<Self, BuildError> {
        let heights = block_heights(raw.cfg())?;
        let cfg = raw.cfg().clone();
        let mut operations = vec![Operation::Nop; cfg.body().len()];
        for block in cfg.blocks() {
            let BlockKind::Code { start, end } = block.kind else {
                continue;
            };
            let mut height = heights[block.id.raw() as usize].unwrap_or(0);
            for raw_offset in start.raw()..end.raw() {
                let offset = Offset::new(raw_offset);
                let (Some(instruction), Some(op)) =
                    (cfg.body().instruction(offset), raw.decode_offset(offset))
                else {
                    continue;
                };
                let effect = instruction.stack_effect(cfg.body().returns_value);
                let (op, after) = name_slots(op, effect, height, offset)?;
                operations[offset.raw() as usize] = op;
                height = after;
            }
        }
        log::trace!("stack heights of {}: {heights:?}", cfg.method());
        Ok(Self {
            raw,
            heights,
            operations,
        })
    }

    pub fn raw(&self) -> &Arc<RawDecoder> {
        &self.raw
    }

    /// Stack height on entry to `block`; `None` for synthetic blocks.
    pub fn height(&self, block: BlockId) -> Option<u16> {
        self.heights.get(block.raw() as usize).copied().flatten()
    }

    pub fn operation(&self, offset: Offset) -> Option<&Operation<Slot>> {
        self.operations.get(offset.raw() as usize)
    }
}

impl Decoder for StackDecoder {
    type Variable = Slot;
    type Expression = Slot;

    fn cfg(&self) -> &Arc<Cfg> {
        self.raw.cfg()
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<Slot>> {
        self.operation(self.cfg().offset(apc)?).cloned()
    }

    fn expression(&self, _apc: &Apc, var: &Slot) -> Option<Slot> {
        Some(*var)
    }
}

/// Height after an instruction with `effect` runs at `height`.
fn height_after(height: u16, effect: StackEffect, offset: Offset) -> Result<u16, BuildError> {
    height
        .checked_sub(effect.pops)
        .ok_or(BuildError::StackUnderflow { offset })?
        .checked_add(effect.pushes)
        .ok_or(BuildError::StackOverflow { offset })
}

/// Rename the implicit stack operands of `op`, executed at stack height
/// `height`. Returns the renamed operation and the height after it.
fn name_slots(
    op: Operation<Source>,
    effect: StackEffect,
    height: u16,
    offset: Offset,
) -> Result<(Operation<Slot>, u16), BuildError> {
    let after = height_after(height, effect, offset)?;
    let base = height - effect.pops;
    let mut next_read = base;
    let op = op.map(|source, access| match (source, access) {
        (Source::Stack, Access::Read) => {
            next_read += 1;
            Slot::Stack(next_read - 1)
        }
        (Source::Stack, Access::Write) => Slot::Stack(after - 1),
        (Source::Local(l), _) => Slot::Local(l),
        (Source::Param(p), _) => Slot::Param(p),
    });
    Ok((op, after))
}

/// Height on entry to each block, propagated along the graph edges.
///
/// Blocks no edge reaches start at their handler's entry height, or at 0
/// for straight-line code after an unconditional transfer.
fn block_heights(cfg: &Cfg) -> Result<Vec<Option<u16>>, BuildError> {
    let body = cfg.body();
    let mut heights: Vec<Option<u16>> = vec![None; cfg.blocks().count()];
    let code_blocks: Vec<BlockId> = cfg
        .blocks()
        .filter(|b| matches!(b.kind, BlockKind::Code { .. }))
        .map(|b| b.id)
        .collect();
    let mut worklist = VecDeque::new();

    for &seed in std::iter::once(&cfg.entry()).chain(&code_blocks) {
        if heights[seed.raw() as usize].is_some() {
            continue;
        }
        let seed_height = cfg
            .subroutines()
            .iter()
            .find(|s| s.entry == seed)
            .map_or(0, |s| s.kind.entry_height() as u16);
        heights[seed.raw() as usize] = Some(seed_height);
        worklist.push_back(seed);

        while let Some(block) = worklist.pop_front() {
            let BlockKind::Code { start, end } = cfg.block(block).kind else {
                continue;
            };
            let mut height = heights[block.raw() as usize].unwrap_or(0);
            let mut terminator = None;
            for raw_offset in start.raw()..end.raw() {
                let offset = Offset::new(raw_offset);
                let Some(instruction) = body.instruction(offset) else {
                    continue;
                };
                height = height_after(height, instruction.stack_effect(body.returns_value), offset)?;
                terminator = Some(instruction);
            }

            for edge in cfg.successor_edges(block) {
                let target = cfg.block(edge.to);
                let BlockKind::Code { start, .. } = target.kind else {
                    continue;
                };
                let entered_subroutine = cfg
                    .subroutines()
                    .iter()
                    .find(|s| s.entry == edge.to)
                    .filter(|_| {
                        matches!(
                            edge.kind,
                            EdgeKind::Handler(_) | EdgeKind::Leave { .. } | EdgeKind::SubroutineReturn
                        )
                    });
                let expected = match (&edge.kind, entered_subroutine) {
                    (_, Some(sub)) => sub.kind.entry_height() as u16,
                    (EdgeKind::SubroutineReturn, None) => 0,
                    _ if matches!(terminator, Some(Instruction::Leave(_))) => 0,
                    _ => height,
                };
                match heights[edge.to.raw() as usize] {
                    None => {
                        heights[edge.to.raw() as usize] = Some(expected);
                        worklist.push_back(edge.to);
                    }
                    Some(found) if found != expected => {
                        return Err(BuildError::StackHeightMismatch {
                            offset: start,
                            expected: found as usize,
                            found: expected as usize,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(heights)
}
