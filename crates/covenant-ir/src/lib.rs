//! Method bodies, program points and control-flow graphs for contract
//! analysis.
//!
//! A [`MethodBody`] is an instruction stream for an implicit-stack machine
//! plus its exception-handling regions. [`Cfg::build`] turns it into basic
//! blocks whose catch, finally and fault handlers are modeled as
//! subroutines, and [`Apc`] names a program point inside that graph together
//! with the stack of subroutine calls that led there.

mod cfg;
mod error;
mod expression;
mod id;
mod instruction;
mod lattice;
mod method;
mod provider;

pub use cfg::{
    Apc, BasicBlock, BlockKind, Cfg, Context, Edge, EdgeKind, Frame, PostDominators, Propagation,
    Resume, Subroutine, SubroutineFacade, Successor,
};
pub use error::{BuildError, ContractResolutionError};
pub use expression::BoxedExpression;
pub use id::{BlockId, FieldId, Local, MethodId, Offset, Param, SubroutineId, TypeId};
pub use instruction::{BinaryOp, CmpOp, Instruction, StackEffect, UnaryOp};
pub use lattice::{FiniteLattice, HasBottom, HasTop, Lattice, ProofOutcome};
pub use method::{ExceptionRegion, FieldDef, HandlerKind, MethodBody, MethodDef};
pub use provider::{ClauseKind, ContractClause, ContractKind, ContractProvider, MetadataProvider};

pub use smallvec::{self, SmallVec};

#[cfg(test)]
mod tests;
