mod apc;
mod builder;

use std::fmt;
use std::sync::Arc;

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Control, DfsEvent, depth_first_search};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::{
    BlockId, BuildError, HandlerKind, Instruction, MetadataProvider, MethodBody, MethodId, Offset,
    SubroutineId,
};

pub use apc::{Apc, Context, Frame, Resume, Successor};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BlockKind {
    /// Instructions `start..end` of the method body.
    Code { start: Offset, end: Offset },
    /// Synthetic target of every `ret`.
    Exit,
    /// Synthetic target of exceptions that leave the method.
    ExceptionExit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Innermost handler subroutine containing the block, `None` for the
    /// method body proper.
    pub owner: Option<SubroutineId>,
}

impl BasicBlock {
    /// Number of program points in the block. Synthetic blocks have a
    /// single point so that analyses can record a state there.
    pub fn len(&self) -> u32 {
        match self.kind {
            BlockKind::Code { start, end } => end.raw() - start.raw(),
            BlockKind::Exit | BlockKind::ExceptionExit => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn offset(&self, index: u32) -> Option<Offset> {
        match self.kind {
            BlockKind::Code { start, end } if start.raw() + index < end.raw() => {
                Some(Offset::new(start.raw() + index))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum EdgeKind {
    /// Next instruction in the same block, or the next block when a block
    /// ends without a terminator.
    Fallthrough,
    Branch,
    /// Conditional branch outcome: the tested value was truthy.
    True,
    /// Conditional branch outcome: the tested value was falsy.
    False,
    Case(u32),
    Default,
    Return,
    /// Exception leaving the method.
    Unwind,
    /// Exception caught by a handler subroutine.
    Handler(SubroutineId),
    /// `leave` that runs `finallies` (innermost first) before `target`.
    Leave {
        finallies: Arc<[SubroutineId]>,
        target: BlockId,
    },
    /// `endfinally` resuming at one of its possible continuations.
    SubroutineReturn,
}

impl EdgeKind {
    pub fn is_exceptional(&self) -> bool {
        matches!(self, EdgeKind::Handler(_) | EdgeKind::Unwind)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Fallthrough => write!(f, "fallthrough"),
            EdgeKind::Branch => write!(f, "branch"),
            EdgeKind::True => write!(f, "true"),
            EdgeKind::False => write!(f, "false"),
            EdgeKind::Case(case) => write!(f, "case {case}"),
            EdgeKind::Default => write!(f, "default"),
            EdgeKind::Return => write!(f, "return"),
            EdgeKind::Unwind => write!(f, "unwind"),
            EdgeKind::Handler(sub) => write!(f, "handler {sub}"),
            EdgeKind::Leave { target, .. } => write!(f, "leave to {target}"),
            EdgeKind::SubroutineReturn => write!(f, "endfinally"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

/// Where an exception goes after a finally or fault handler completes.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Propagation {
    Handler(SubroutineId),
    Unwind,
}

/// A handler region modeled as a subroutine called from the protected
/// code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subroutine {
    pub id: SubroutineId,
    pub kind: HandlerKind,
    /// Index of the exception region this subroutine handles.
    pub region: usize,
    pub entry: BlockId,
    /// Subroutine owning the protected range, `None` for the method body.
    pub parent: Option<SubroutineId>,
    /// Handlers reached when an exception keeps propagating after this
    /// subroutine ends. Empty for catch clauses.
    pub propagation: SmallVec<[Propagation; 2]>,
}

/// Control-flow graph of one method body.
#[derive(Clone, Debug)]
pub struct Cfg {
    method: MethodId,
    body: Arc<MethodBody>,
    blocks: Vec<BasicBlock>,
    edges: Vec<Edge>,
    successors: Vec<SmallVec<[usize; 2]>>,
    predecessors: Vec<SmallVec<[usize; 2]>>,
    subroutines: Vec<Subroutine>,
    entry: BlockId,
    exit: BlockId,
    exception_exit: BlockId,
}

impl Cfg {
    /// Build the graph of `method` from the body served by `metadata`.
    pub fn build(method: MethodId, metadata: &dyn MetadataProvider) -> Result<Self, BuildError> {
        let body = metadata
            .method(method)
            .and_then(|def| def.body.as_ref())
            .ok_or(BuildError::MissingBody(method))?;
        Self::from_body(method, Arc::new(body.clone()))
    }

    pub fn from_body(method: MethodId, body: Arc<MethodBody>) -> Result<Self, BuildError> {
        builder::build(method, body)
    }

    pub fn method(&self) -> MethodId {
        self.method
    }

    pub fn body(&self) -> &Arc<MethodBody> {
        &self.body
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    pub fn exception_exit(&self) -> BlockId {
        self.exception_exit
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn successor_edges(&self, block: BlockId) -> impl Iterator<Item = &Edge> {
        self.successors[block.index()]
            .iter()
            .map(|&e| &self.edges[e])
    }

    pub fn predecessor_edges(&self, block: BlockId) -> impl Iterator<Item = &Edge> {
        self.predecessors[block.index()]
            .iter()
            .map(|&e| &self.edges[e])
    }

    pub fn subroutines(&self) -> &[Subroutine] {
        &self.subroutines
    }

    pub fn subroutine(&self, id: SubroutineId) -> &Subroutine {
        &self.subroutines[id.index()]
    }

    /// Block whose first instruction is at `offset`.
    pub fn block_starting_at(&self, offset: Offset) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|b| matches!(b.kind, BlockKind::Code { start, .. } if start == offset))
            .map(|b| b.id)
    }

    pub fn offset(&self, apc: &Apc) -> Option<Offset> {
        self.block(apc.block).offset(apc.index)
    }

    /// Instruction at a program point; `None` for synthetic exit points.
    pub fn instruction(&self, apc: &Apc) -> Option<&Instruction> {
        self.offset(apc).and_then(|o| self.body.instruction(o))
    }

    /// Every program point of the method body in the root context, in
    /// block order.
    pub fn points(&self) -> impl Iterator<Item = Apc> + '_ {
        self.blocks.iter().flat_map(|b| {
            (0..b.len()).map(move |i| Apc::new(b.id, i, Context::root()))
        })
    }

    /// Whether `sub` is `owner` or one of its enclosing subroutines.
    pub fn encloses(&self, sub: SubroutineId, owner: Option<SubroutineId>) -> bool {
        let mut current = owner;
        while let Some(s) = current {
            if s == sub {
                return true;
            }
            current = self.subroutine(s).parent;
        }
        false
    }

    fn flow_graph(&self, reversed: bool, exceptional: bool) -> DiGraph<BlockId, ()> {
        let mut graph = DiGraph::with_capacity(self.blocks.len(), self.edges.len());
        for block in &self.blocks {
            graph.add_node(block.id);
        }
        for edge in self.edges.iter().filter(|e| exceptional || !e.kind.is_exceptional()) {
            let (from, to) = if reversed {
                (edge.to, edge.from)
            } else {
                (edge.from, edge.to)
            };
            graph.add_edge(NodeIndex::new(from.index()), NodeIndex::new(to.index()), ());
        }
        graph
    }

    /// Blocks targeted by a back edge of a depth-first walk from the entry
    /// (loop headers). Every cycle, including one closed through a handler,
    /// enters one of them.
    pub fn back_edge_targets(&self) -> FxHashSet<BlockId> {
        let graph = self.flow_graph(false, true);
        let mut targets = FxHashSet::default();
        depth_first_search(&graph, Some(NodeIndex::new(self.entry.index())), |event| {
            if let DfsEvent::BackEdge(_, to) = event {
                targets.insert(graph[to]);
            }
            Control::<()>::Continue
        });
        targets
    }

    /// Post-dominator tree over normal control flow, rooted at the exit.
    pub fn post_dominators(&self) -> PostDominators {
        let graph = self.flow_graph(true, false);
        PostDominators(dominators::simple_fast(
            &graph,
            NodeIndex::new(self.exit.index()),
        ))
    }
}

pub struct PostDominators(Dominators<NodeIndex>);

impl PostDominators {
    /// Whether every normal path from `block` to the exit goes through
    /// `by`. Blocks that never reach the exit are post-dominated by
    /// nothing.
    pub fn post_dominates(&self, by: BlockId, block: BlockId) -> bool {
        self.0
            .dominators(NodeIndex::new(block.index()))
            .is_some_and(|mut it| it.any(|n| n.index() == by.index()))
    }
}

/// Builds control-flow graphs for every method of a run.
///
/// Stateless, so one facade is shared by all method drivers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubroutineFacade;

impl SubroutineFacade {
    pub fn build(
        &self,
        method: MethodId,
        metadata: &dyn MetadataProvider,
    ) -> Result<Cfg, BuildError> {
        Cfg::build(method, metadata)
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            match block.kind {
                BlockKind::Code { start, end } => write!(f, "{} [{start}..{end})", block.id)?,
                BlockKind::Exit => write!(f, "{} exit", block.id)?,
                BlockKind::ExceptionExit => write!(f, "{} exception-exit", block.id)?,
            }
            if let Some(owner) = block.owner {
                write!(f, " in {owner}")?;
            }
            write!(f, " ->")?;
            for edge in self.successor_edges(block.id) {
                write!(f, " {} ({})", edge.to, edge.kind)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
