//! In-memory providers and assertion helpers shared by the covenant test
//! suites and demos.

pub mod lattice;
mod metadata;

pub use metadata::{InMemoryContracts, InMemoryMetadata, contract_library};

use covenant_ir::{Instruction, MethodId, Offset};

/// Shorthand for a call that pops `args` and pushes nothing.
pub fn call(method: MethodId, args: u16) -> Instruction {
    Instruction::Call {
        method,
        args,
        returns: false,
    }
}

/// Shorthand for a call that pops `args` and pushes its result.
pub fn call_value(method: MethodId, args: u16) -> Instruction {
    Instruction::Call {
        method,
        args,
        returns: true,
    }
}

pub fn at(offset: u32) -> Offset {
    Offset::new(offset)
}
