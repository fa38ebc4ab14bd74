use std::fmt;
use std::sync::Arc;

use covenant_ir::{Apc, Cfg, Instruction, Local, Offset, Param};
use smallvec::smallvec;

use crate::{Args, Decoder, Operation};

/// Operand of a raw operation: the implicit evaluation stack, or a named
/// local or parameter.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Source {
    Stack,
    Local(Local),
    Param(Param),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stack => write!(f, "stack"),
            Source::Local(l) => write!(f, "{l}"),
            Source::Param(p) => write!(f, "{p}"),
        }
    }
}

/// Decodes the method body as written: stack operands stay implicit.
#[derive(Debug)]
pub struct RawDecoder {
    cfg: Arc<Cfg>,
}

impl RawDecoder {
    pub fn new(cfg: Arc<Cfg>) -> Self {
        Self { cfg }
    }

    pub fn decode_offset(&self, offset: Offset) -> Option<Operation<Source>> {
        let body = self.cfg.body();
        body.instruction(offset)
            .map(|i| decode_instruction(i, body.returns_value))
    }
}

impl Decoder for RawDecoder {
    type Variable = Source;
    type Expression = Source;

    fn cfg(&self) -> &Arc<Cfg> {
        &self.cfg
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<Source>> {
        self.decode_offset(self.cfg.offset(apc)?)
    }

    fn expression(&self, _apc: &Apc, var: &Source) -> Option<Source> {
        Some(*var)
    }
}

fn decode_instruction(instruction: &Instruction, returns_value: bool) -> Operation<Source> {
    use Source::Stack;
    let stack_args = |n: u16| -> Args<Source> { (0..n).map(|_| Stack).collect() };
    match instruction {
        Instruction::Nop => Operation::Nop,
        Instruction::LoadArg(p) => Operation::Copy {
            dest: Stack,
            source: Source::Param(*p),
        },
        Instruction::StoreArg(p) => Operation::Copy {
            dest: Source::Param(*p),
            source: Stack,
        },
        Instruction::LoadLocal(l) => Operation::Copy {
            dest: Stack,
            source: Source::Local(*l),
        },
        Instruction::StoreLocal(l) => Operation::Copy {
            dest: Source::Local(*l),
            source: Stack,
        },
        Instruction::LoadNull => Operation::LoadNull { dest: Stack },
        Instruction::LoadConst(value) => Operation::LoadConst {
            dest: Stack,
            value: *value,
        },
        Instruction::Dup => Operation::Copy {
            dest: Stack,
            source: Stack,
        },
        Instruction::Pop => Operation::Pop {
            values: smallvec![Stack],
        },
        Instruction::Binary(op) => Operation::Binary {
            dest: Stack,
            op: *op,
            left: Stack,
            right: Stack,
        },
        Instruction::Unary(op) => Operation::Unary {
            dest: Stack,
            op: *op,
            operand: Stack,
        },
        Instruction::Compare(op) => Operation::Compare {
            dest: Stack,
            op: *op,
            left: Stack,
            right: Stack,
        },
        Instruction::NewObj { ctor, args } => Operation::NewObj {
            dest: Stack,
            ctor: *ctor,
            args: stack_args(*args),
        },
        Instruction::Call {
            method,
            args,
            returns,
        } => Operation::Call {
            dest: returns.then_some(Stack),
            method: *method,
            args: stack_args(*args),
        },
        Instruction::LoadField(field) => Operation::LoadField {
            dest: Stack,
            object: Stack,
            field: *field,
        },
        Instruction::StoreField(field) => Operation::StoreField {
            object: Stack,
            field: *field,
            value: Stack,
        },
        Instruction::Branch(_) | Instruction::Leave(_) => Operation::Branch,
        Instruction::BranchTrue(_) => Operation::BranchTrue { cond: Stack },
        Instruction::BranchFalse(_) => Operation::BranchFalse { cond: Stack },
        Instruction::Switch(_) => Operation::Switch { value: Stack },
        Instruction::Return => Operation::Return {
            value: returns_value.then_some(Stack),
        },
        Instruction::Throw => Operation::Throw { exception: Stack },
        Instruction::EndFinally => Operation::EndFinally,
    }
}
