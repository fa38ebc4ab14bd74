use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::{BlockKind, Cfg, EdgeKind, Propagation};
use crate::{BlockId, HandlerKind, Instruction, SubroutineId};

/// What happens once a handler subroutine completes.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Resume {
    /// Catch clause: control leaves through an explicit `leave`.
    Handled,
    /// Finally or fault run during exception propagation.
    Propagate,
    /// Finally run by a `leave`: run `pending` next, then go to `target`.
    Leave {
        pending: Arc<[SubroutineId]>,
        target: BlockId,
    },
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Frame {
    pub subroutine: SubroutineId,
    pub resume: Resume,
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct Node {
    frame: Frame,
    parent: Context,
    depth: usize,
}

/// Stack of subroutine calls leading to a program point, innermost on top.
///
/// Persistent: pushing shares the tail with the original context.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Context(Option<Arc<Node>>);

impl Context {
    pub fn root() -> Self {
        Self(None)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    pub fn push(&self, frame: Frame) -> Self {
        let depth = self.depth() + 1;
        Self(Some(Arc::new(Node {
            frame,
            parent: self.clone(),
            depth,
        })))
    }

    pub fn pop(&self) -> Self {
        match &self.0 {
            Some(node) => node.parent.clone(),
            None => Self::root(),
        }
    }

    pub fn top(&self) -> Option<&Frame> {
        self.0.as_deref().map(|node| &node.frame)
    }

    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |node| node.depth)
    }

    /// Frames from the innermost outwards.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        let mut current = self.0.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.parent.0.as_deref();
            Some(&node.frame)
        })
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frames: Vec<_> = self.frames().collect();
        for (i, frame) in frames.iter().rev().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", frame.subroutine)?;
        }
        Ok(())
    }
}

/// Abstract program counter: a point inside a block, reached under a
/// subroutine context.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Apc {
    pub block: BlockId,
    pub index: u32,
    pub context: Context,
}

impl Apc {
    pub fn new(block: BlockId, index: u32, context: Context) -> Self {
        Self {
            block,
            index,
            context,
        }
    }

    /// The same point with an empty context.
    pub fn in_root(&self) -> Self {
        Self::new(self.block, self.index, Context::root())
    }
}

impl fmt::Display for Apc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.index)?;
        if !self.context.is_root() {
            write!(f, " [{}]", self.context)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Successor {
    pub apc: Apc,
    pub kind: EdgeKind,
}

impl Successor {
    /// Whether the step raises an exception. Such a step leaves its point
    /// before the instruction there completes, so analyses propagate the
    /// state from before the instruction along it.
    pub fn is_exceptional(&self) -> bool {
        self.kind.is_exceptional()
    }
}

impl Cfg {
    pub fn entry_point(&self) -> Apc {
        Apc::new(self.entry, 0, Context::root())
    }

    pub fn exit_point(&self) -> Apc {
        Apc::new(self.exit, 0, Context::root())
    }

    pub fn exception_exit_point(&self) -> Apc {
        Apc::new(self.exception_exit, 0, Context::root())
    }

    pub fn is_last_point(&self, apc: &Apc) -> bool {
        apc.index + 1 >= self.block(apc.block).len()
    }

    /// Pop the frames of subroutines that do not enclose `owner`.
    fn normalize(&self, context: &Context, owner: Option<SubroutineId>) -> Context {
        let mut context = context.clone();
        while let Some(frame) = context.top() {
            if self.encloses(frame.subroutine, owner) {
                break;
            }
            context = context.pop();
        }
        context
    }

    fn enter(&self, context: &Context, subroutine: SubroutineId, resume: Resume) -> Apc {
        let sub = self.subroutine(subroutine);
        let context = self.normalize(context, sub.parent).push(Frame { subroutine, resume });
        Apc::new(sub.entry, 0, context)
    }

    fn goto(&self, context: &Context, block: BlockId) -> Apc {
        let owner = self.block(block).owner;
        Apc::new(block, 0, self.normalize(context, owner))
    }

    fn propagate(&self, context: &Context, step: Propagation) -> Successor {
        match step {
            Propagation::Handler(sub) => {
                let resume = match self.subroutine(sub).kind {
                    HandlerKind::Catch(_) => Resume::Handled,
                    HandlerKind::Finally | HandlerKind::Fault => Resume::Propagate,
                };
                Successor {
                    apc: self.enter(context, sub, resume),
                    kind: EdgeKind::Handler(sub),
                }
            }
            Propagation::Unwind => Successor {
                apc: self.exception_exit_point(),
                kind: EdgeKind::Unwind,
            },
        }
    }

    /// Program points reachable in one step from `apc`, each with the
    /// context it is reached under.
    ///
    /// Inside a block this is the next instruction. At the end of a block
    /// the graph edges are followed, entering handler subroutines with a
    /// pushed frame; an `endfinally` pops its frame and continues where that
    /// frame says, so only the continuation actually pending is produced.
    ///
    /// Exceptional successors leave from every instruction that may raise,
    /// not only from the end of the block. They are reached before the
    /// raising instruction completes (see [`Successor::is_exceptional`]).
    pub fn successors(&self, apc: &Apc) -> SmallVec<[Successor; 2]> {
        let block = self.block(apc.block);
        let mut out = SmallVec::new();
        if !matches!(block.kind, BlockKind::Code { .. }) {
            return out;
        }
        let context = &apc.context;
        let instruction = self.instruction(apc);

        if !self.is_last_point(apc) {
            out.push(Successor {
                apc: Apc::new(apc.block, apc.index + 1, context.clone()),
                kind: EdgeKind::Fallthrough,
            });
        } else {
            if matches!(instruction, Some(Instruction::EndFinally)) {
                out.extend(self.return_from_subroutine(context));
            }
            for edge in self.successor_edges(apc.block) {
                let successor = match &edge.kind {
                    EdgeKind::SubroutineReturn | EdgeKind::Handler(_) | EdgeKind::Unwind => {
                        continue;
                    }
                    EdgeKind::Leave { finallies, target } => {
                        let Some((first, rest)) = finallies.split_first() else {
                            continue;
                        };
                        let resume = Resume::Leave {
                            pending: rest.into(),
                            target: *target,
                        };
                        Successor {
                            apc: self.enter(context, *first, resume),
                            kind: edge.kind.clone(),
                        }
                    }
                    EdgeKind::Return => Successor {
                        apc: self.exit_point(),
                        kind: EdgeKind::Return,
                    },
                    kind => Successor {
                        apc: self.goto(context, edge.to),
                        kind: kind.clone(),
                    },
                };
                out.push(successor);
            }
        }

        if instruction.is_some_and(Instruction::may_throw) {
            for edge in self.successor_edges(apc.block) {
                match edge.kind {
                    EdgeKind::Handler(sub) => {
                        out.push(self.propagate(context, Propagation::Handler(sub)));
                    }
                    EdgeKind::Unwind => out.push(self.propagate(context, Propagation::Unwind)),
                    _ => {}
                }
            }
        }
        out
    }

    fn return_from_subroutine(&self, context: &Context) -> SmallVec<[Successor; 2]> {
        let mut out = SmallVec::new();
        let Some(frame) = context.top() else {
            return out;
        };
        let caller = context.pop();
        match &frame.resume {
            Resume::Handled => {}
            Resume::Leave { pending, target } => {
                let apc = match pending.split_first() {
                    Some((next, rest)) => {
                        let resume = Resume::Leave {
                            pending: rest.into(),
                            target: *target,
                        };
                        self.enter(&caller, *next, resume)
                    }
                    None => self.goto(&caller, *target),
                };
                out.push(Successor {
                    apc,
                    kind: EdgeKind::SubroutineReturn,
                });
            }
            Resume::Propagate => {
                for &step in &self.subroutine(frame.subroutine).propagation {
                    out.push(self.propagate(&caller, step));
                }
            }
        }
        out
    }
}
