use std::fmt;

use crate::{FieldId, Local, MethodId, Offset, Param};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// The operator that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    pub fn eval(self, left: i64, right: i64) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// One instruction of an implicit-stack method body.
///
/// Branch targets are instruction offsets. `Call` and `NewObj` carry their
/// argument count (receiver included) so the stack effect of every
/// instruction is known without consulting metadata.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    LoadArg(Param),
    StoreArg(Param),
    LoadLocal(Local),
    StoreLocal(Local),
    LoadNull,
    LoadConst(i64),
    Dup,
    Pop,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Compare(CmpOp),
    NewObj { ctor: MethodId, args: u16 },
    Call { method: MethodId, args: u16, returns: bool },
    LoadField(FieldId),
    StoreField(FieldId),
    Branch(Offset),
    BranchTrue(Offset),
    BranchFalse(Offset),
    Switch(Vec<Offset>),
    /// Pops the return value when the method returns one.
    Return,
    Throw,
    /// Exit a protected region, running any finally handlers in between.
    Leave(Offset),
    EndFinally,
}

/// Number of stack slots an instruction consumes and produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: u16,
    pub pushes: u16,
}

impl StackEffect {
    const fn new(pops: u16, pushes: u16) -> Self {
        Self { pops, pushes }
    }
}

impl Instruction {
    pub fn stack_effect(&self, returns_value: bool) -> StackEffect {
        match self {
            Instruction::Nop
            | Instruction::Branch(_)
            | Instruction::Leave(_)
            | Instruction::EndFinally => StackEffect::new(0, 0),
            Instruction::LoadArg(_)
            | Instruction::LoadLocal(_)
            | Instruction::LoadNull
            | Instruction::LoadConst(_) => StackEffect::new(0, 1),
            Instruction::StoreArg(_)
            | Instruction::StoreLocal(_)
            | Instruction::Pop
            | Instruction::BranchTrue(_)
            | Instruction::BranchFalse(_)
            | Instruction::Switch(_)
            | Instruction::Throw => StackEffect::new(1, 0),
            Instruction::Dup => StackEffect::new(1, 2),
            Instruction::Binary(_) | Instruction::Compare(_) => StackEffect::new(2, 1),
            Instruction::Unary(_) | Instruction::LoadField(_) => StackEffect::new(1, 1),
            Instruction::StoreField(_) => StackEffect::new(2, 0),
            Instruction::NewObj { args, .. } => StackEffect::new(*args, 1),
            Instruction::Call { args, returns, .. } => StackEffect::new(*args, u16::from(*returns)),
            Instruction::Return => StackEffect::new(u16::from(returns_value), 0),
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Branch(_)
                | Instruction::BranchTrue(_)
                | Instruction::BranchFalse(_)
                | Instruction::Switch(_)
                | Instruction::Return
                | Instruction::Throw
                | Instruction::Leave(_)
                | Instruction::EndFinally
        )
    }

    /// Whether execution may continue at the next offset.
    pub fn falls_through(&self) -> bool {
        !self.is_terminator()
            || matches!(
                self,
                Instruction::BranchTrue(_) | Instruction::BranchFalse(_) | Instruction::Switch(_)
            )
    }

    /// Whether the instruction may raise an exception.
    pub fn may_throw(&self) -> bool {
        matches!(
            self,
            Instruction::Throw
                | Instruction::Call { .. }
                | Instruction::NewObj { .. }
                | Instruction::LoadField(_)
                | Instruction::StoreField(_)
                | Instruction::Binary(BinaryOp::Div | BinaryOp::Rem)
        )
    }

    /// Explicit branch targets, not including fallthrough.
    pub fn targets(&self) -> &[Offset] {
        match self {
            Instruction::Branch(t)
            | Instruction::BranchTrue(t)
            | Instruction::BranchFalse(t)
            | Instruction::Leave(t) => std::slice::from_ref(t),
            Instruction::Switch(ts) => ts,
            _ => &[],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::LoadArg(p) => write!(f, "ldarg {p}"),
            Instruction::StoreArg(p) => write!(f, "starg {p}"),
            Instruction::LoadLocal(l) => write!(f, "ldloc {l}"),
            Instruction::StoreLocal(l) => write!(f, "stloc {l}"),
            Instruction::LoadNull => write!(f, "ldnull"),
            Instruction::LoadConst(c) => write!(f, "ldc {c}"),
            Instruction::Dup => write!(f, "dup"),
            Instruction::Pop => write!(f, "pop"),
            Instruction::Binary(op) => write!(f, "binop {}", op.symbol()),
            Instruction::Unary(op) => write!(f, "unop {}", op.symbol()),
            Instruction::Compare(op) => write!(f, "cmp {}", op.symbol()),
            Instruction::NewObj { ctor, args } => write!(f, "newobj {ctor}/{args}"),
            Instruction::Call {
                method,
                args,
                returns,
            } => {
                write!(f, "call {method}/{args}")?;
                if *returns {
                    write!(f, " -> value")?;
                }
                Ok(())
            }
            Instruction::LoadField(field) => write!(f, "ldfld {field}"),
            Instruction::StoreField(field) => write!(f, "stfld {field}"),
            Instruction::Branch(t) => write!(f, "br {t}"),
            Instruction::BranchTrue(t) => write!(f, "brtrue {t}"),
            Instruction::BranchFalse(t) => write!(f, "brfalse {t}"),
            Instruction::Switch(ts) => {
                write!(f, "switch (")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Instruction::Return => write!(f, "ret"),
            Instruction::Throw => write!(f, "throw"),
            Instruction::Leave(t) => write!(f, "leave {t}"),
            Instruction::EndFinally => write!(f, "endfinally"),
        }
    }
}
