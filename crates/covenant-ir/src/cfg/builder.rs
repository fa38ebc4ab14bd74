use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::{SmallVec, smallvec};

use super::{BasicBlock, BlockKind, Cfg, Edge, EdgeKind, Propagation, Subroutine};
use crate::{
    BlockId, BuildError, ExceptionRegion, HandlerKind, Instruction, MethodBody, MethodId, Offset,
    SubroutineId,
};

pub(super) fn build(method: MethodId, body: Arc<MethodBody>) -> Result<Cfg, BuildError> {
    if body.is_empty() {
        return Err(BuildError::EmptyBody);
    }
    check_regions(&body)?;
    check_targets(&body)?;

    let len = body.len() as u32;
    let mut leaders = BTreeSet::from([0u32]);
    for (offset, instruction) in body.instructions.iter().enumerate() {
        let offset = offset as u32;
        leaders.extend(instruction.targets().iter().map(|t| t.raw()));
        if instruction.is_terminator() && offset + 1 < len {
            leaders.insert(offset + 1);
        }
    }
    for region in &body.regions {
        for bound in [
            region.try_range.start,
            region.try_range.end,
            region.handler_range.start,
            region.handler_range.end,
        ] {
            if bound < len {
                leaders.insert(bound);
            }
        }
    }

    let mut builder = Builder {
        body: &body,
        blocks: Vec::new(),
        block_at: IndexMap::new(),
        edges: Vec::new(),
    };
    builder.split_blocks(&leaders);
    let exit = builder.push_block(BlockKind::Exit, None);
    let exception_exit = builder.push_block(BlockKind::ExceptionExit, None);
    let subroutines = builder.subroutines();
    builder.wire_edges(&subroutines, exit, exception_exit);

    let block_count = builder.blocks.len();
    let mut successors = vec![SmallVec::new(); block_count];
    let mut predecessors = vec![SmallVec::new(); block_count];
    for (index, edge) in builder.edges.iter().enumerate() {
        successors[edge.from.index()].push(index);
        predecessors[edge.to.index()].push(index);
    }

    Ok(Cfg {
        method,
        entry: builder.block_at[&0],
        blocks: builder.blocks,
        edges: builder.edges,
        successors,
        predecessors,
        subroutines,
        exit,
        exception_exit,
        body,
    })
}

fn nested_or_disjoint(a: &Range<u32>, b: &Range<u32>) -> bool {
    a.end <= b.start
        || b.end <= a.start
        || (a.start >= b.start && a.end <= b.end)
        || (b.start >= a.start && b.end <= a.end)
}

fn check_regions(body: &MethodBody) -> Result<(), BuildError> {
    let len = body.len() as u32;
    for (index, region) in body.regions.iter().enumerate() {
        let in_bounds = |r: &Range<u32>| r.start < r.end && r.end <= len;
        if !in_bounds(&region.try_range)
            || !in_bounds(&region.handler_range)
            || !(region.try_range.end <= region.handler_range.start
                || region.handler_range.end <= region.try_range.start)
        {
            return Err(BuildError::UnbalancedRegion { region: index });
        }
        for other in &body.regions[..index] {
            let ranges = [&region.try_range, &region.handler_range];
            let others = [&other.try_range, &other.handler_range];
            let balanced = ranges
                .iter()
                .all(|r| others.iter().all(|o| nested_or_disjoint(r, o)));
            if !balanced {
                return Err(BuildError::UnbalancedRegion { region: index });
            }
        }
    }
    Ok(())
}

fn check_targets(body: &MethodBody) -> Result<(), BuildError> {
    let len = body.len() as u32;
    for (offset, instruction) in body.instructions.iter().enumerate() {
        let offset = Offset::new(offset as u32);
        if let Some(&target) = instruction.targets().iter().find(|t| t.raw() >= len) {
            return Err(BuildError::BranchOutOfRange { offset, target });
        }
    }
    let last = Offset::new(len - 1);
    match body.instruction(last) {
        Some(instruction) if instruction.falls_through() => {
            Err(BuildError::FallsOffEnd { offset: last })
        }
        _ => Ok(()),
    }
}

/// Try regions enclosing a point, innermost first. Regions sharing a try
/// range keep their declaration order.
fn enclosing_tries<'r>(
    regions: &'r [ExceptionRegion],
    encloses: impl Fn(&ExceptionRegion) -> bool,
) -> Vec<(usize, &'r ExceptionRegion)> {
    let mut tries: Vec<_> = regions.iter().enumerate().filter(|(_, r)| encloses(r)).collect();
    tries.sort_by_key(|(index, r)| (r.try_range.len(), *index));
    tries
}

/// Handlers an exception visits when raised under `tries`, ending with an
/// unwind when no handler stops it.
fn propagation(tries: &[(usize, &ExceptionRegion)]) -> SmallVec<[Propagation; 2]> {
    let mut out = SmallVec::new();
    let mut stopped_at: Option<&Range<u32>> = None;
    for (index, region) in tries {
        if let Some(range) = stopped_at {
            if *range != region.try_range {
                return out;
            }
        }
        out.push(Propagation::Handler(SubroutineId::new(*index as u32)));
        if region.kind.stops_propagation() {
            stopped_at = Some(&region.try_range);
        }
    }
    if stopped_at.is_none() {
        out.push(Propagation::Unwind);
    }
    out
}

struct Builder<'b> {
    body: &'b MethodBody,
    blocks: Vec<BasicBlock>,
    block_at: IndexMap<u32, BlockId>,
    edges: Vec<Edge>,
}

impl Builder<'_> {
    fn push_block(&mut self, kind: BlockKind, owner: Option<SubroutineId>) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock { id, kind, owner });
        id
    }

    /// Innermost handler region containing `offset`.
    fn owner_of(&self, offset: u32) -> Option<SubroutineId> {
        self.body
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.handler_range.contains(&offset))
            .min_by_key(|(_, r)| r.handler_range.len())
            .map(|(index, _)| SubroutineId::new(index as u32))
    }

    fn split_blocks(&mut self, leaders: &BTreeSet<u32>) {
        let len = self.body.len() as u32;
        let starts: Vec<u32> = leaders.iter().copied().collect();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(len);
            let owner = self.owner_of(start);
            let kind = BlockKind::Code {
                start: Offset::new(start),
                end: Offset::new(end),
            };
            let id = self.push_block(kind, owner);
            self.block_at.insert(start, id);
        }
    }

    fn subroutines(&self) -> Vec<Subroutine> {
        let regions = &self.body.regions;
        regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                let propagation = match region.kind {
                    HandlerKind::Catch(_) => SmallVec::new(),
                    HandlerKind::Finally | HandlerKind::Fault => {
                        let outer = enclosing_tries(regions, |r| {
                            r.try_range != region.try_range
                                && r.try_range.start <= region.try_range.start
                                && region.try_range.end <= r.try_range.end
                        });
                        propagation(&outer)
                    }
                };
                Subroutine {
                    id: SubroutineId::new(index as u32),
                    kind: region.kind,
                    region: index,
                    entry: self.block_at[&region.handler_range.start],
                    parent: self.owner_of(region.try_range.start),
                    propagation,
                }
            })
            .collect()
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        let edge = Edge { from, to, kind };
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    fn propagation_target(
        subroutines: &[Subroutine],
        step: Propagation,
        exception_exit: BlockId,
    ) -> (BlockId, EdgeKind) {
        match step {
            Propagation::Handler(sub) => (subroutines[sub.index()].entry, EdgeKind::Handler(sub)),
            Propagation::Unwind => (exception_exit, EdgeKind::Unwind),
        }
    }

    fn wire_edges(&mut self, subroutines: &[Subroutine], exit: BlockId, exception_exit: BlockId) {
        let body = self.body;
        let regions = &body.regions;
        let code_blocks: Vec<(BlockId, Offset, Offset)> = self
            .blocks
            .iter()
            .filter_map(|b| match b.kind {
                BlockKind::Code { start, end } => Some((b.id, start, end)),
                _ => None,
            })
            .collect();
        let mut end_finally_blocks = Vec::new();

        for &(block, start, end) in &code_blocks {
            let last = Offset::new(end.raw() - 1);
            let next = self.block_at.get(&end.raw()).copied();
            let instructions = &body.instructions[start.index()..end.index()];
            let terminator = &body.instructions[last.index()];
            let tries = enclosing_tries(regions, |r| r.protects(start));
            let exceptional = propagation(&tries);

            let mut out: SmallVec<[(BlockId, EdgeKind); 2]> = smallvec![];
            match terminator {
                Instruction::Branch(t) => out.push((self.block_at[&t.raw()], EdgeKind::Branch)),
                Instruction::BranchTrue(t) => {
                    out.push((self.block_at[&t.raw()], EdgeKind::True));
                    out.extend(next.map(|n| (n, EdgeKind::False)));
                }
                Instruction::BranchFalse(t) => {
                    out.push((self.block_at[&t.raw()], EdgeKind::False));
                    out.extend(next.map(|n| (n, EdgeKind::True)));
                }
                Instruction::Switch(targets) => {
                    for (case, t) in targets.iter().enumerate() {
                        out.push((self.block_at[&t.raw()], EdgeKind::Case(case as u32)));
                    }
                    out.extend(next.map(|n| (n, EdgeKind::Default)));
                }
                Instruction::Return => out.push((exit, EdgeKind::Return)),
                Instruction::Throw => {
                    for &step in &exceptional {
                        out.push(Self::propagation_target(subroutines, step, exception_exit));
                    }
                }
                Instruction::Leave(t) => {
                    let target = self.block_at[&t.raw()];
                    let finallies: Arc<[SubroutineId]> = tries
                        .iter()
                        .filter(|(_, r)| r.kind == HandlerKind::Finally && !r.protects(*t))
                        .map(|(index, _)| SubroutineId::new(*index as u32))
                        .collect();
                    match finallies.first() {
                        Some(first) => {
                            let entry = subroutines[first.index()].entry;
                            out.push((entry, EdgeKind::Leave { finallies, target }));
                        }
                        None => out.push((target, EdgeKind::Branch)),
                    }
                }
                Instruction::EndFinally => end_finally_blocks.push(block),
                _ => out.extend(next.map(|n| (n, EdgeKind::Fallthrough))),
            }

            let throws_inside = !matches!(terminator, Instruction::Throw)
                && instructions.iter().any(Instruction::may_throw)
                && !tries.is_empty();
            if throws_inside {
                for &step in &exceptional {
                    out.push(Self::propagation_target(subroutines, step, exception_exit));
                }
            }
            for (to, kind) in out {
                self.add_edge(block, to, kind);
            }
        }

        // `endfinally` may resume at any continuation recorded by a `leave`
        // through the subroutine, or keep unwinding.
        for block in end_finally_blocks {
            let Some(owner) = self.blocks[block.index()].owner else {
                continue;
            };
            let mut continuations: Vec<BlockId> = Vec::new();
            for edge in &self.edges {
                if let EdgeKind::Leave { finallies, target } = &edge.kind {
                    if let Some(pos) = finallies.iter().position(|s| *s == owner) {
                        let resume = finallies
                            .get(pos + 1)
                            .map(|next| subroutines[next.index()].entry)
                            .unwrap_or(*target);
                        continuations.push(resume);
                    }
                }
            }
            for &step in &subroutines[owner.index()].propagation {
                continuations.push(Self::propagation_target(subroutines, step, exception_exit).0);
            }
            for to in continuations {
                self.add_edge(block, to, EdgeKind::SubroutineReturn);
            }
        }
    }
}
