use std::fmt;

use covenant_ir::{BinaryOp, CmpOp, FieldId, MethodId, UnaryOp};
use smallvec::SmallVec;

pub type Args<V> = SmallVec<[V; 4]>;

/// One decoded instruction, with operands and result named by the layer's
/// variable type `V`.
///
/// Every layer decodes to this closed set; analyses dispatch on it with an
/// exhaustive `match`. Each operation writes at most one variable, its
/// `dest`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Operation<V> {
    Nop,
    /// `ldarg`, `ldloc`, `starg`, `stloc` and `dup`.
    Copy { dest: V, source: V },
    LoadNull { dest: V },
    LoadConst { dest: V, value: i64 },
    Binary { dest: V, op: BinaryOp, left: V, right: V },
    Unary { dest: V, op: UnaryOp, operand: V },
    Compare { dest: V, op: CmpOp, left: V, right: V },
    NewObj { dest: V, ctor: MethodId, args: Args<V> },
    Call { dest: Option<V>, method: MethodId, args: Args<V> },
    LoadField { dest: V, object: V, field: FieldId },
    StoreField { object: V, field: FieldId, value: V },
    /// Discard values: `pop`, and calls elided by a contract-free view.
    Pop { values: Args<V> },
    /// `br` and `leave`.
    Branch,
    BranchTrue { cond: V },
    BranchFalse { cond: V },
    Switch { value: V },
    Return { value: Option<V> },
    Throw { exception: V },
    EndFinally,
}

/// Whether a variable is read or written by an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl<V> Operation<V> {
    /// Rename every variable. `f` sees the reads in operand order, then the
    /// write.
    pub fn map<W>(self, mut f: impl FnMut(V, Access) -> W) -> Operation<W> {
        use Access::{Read, Write};
        fn args<V, W>(args: Args<V>, f: &mut impl FnMut(V, Access) -> W) -> Args<W> {
            args.into_iter().map(|a| f(a, Access::Read)).collect()
        }
        match self {
            Operation::Nop => Operation::Nop,
            Operation::Copy { dest, source } => {
                let source = f(source, Read);
                Operation::Copy {
                    dest: f(dest, Write),
                    source,
                }
            }
            Operation::LoadNull { dest } => Operation::LoadNull {
                dest: f(dest, Write),
            },
            Operation::LoadConst { dest, value } => Operation::LoadConst {
                dest: f(dest, Write),
                value,
            },
            Operation::Binary {
                dest,
                op,
                left,
                right,
            } => {
                let left = f(left, Read);
                let right = f(right, Read);
                Operation::Binary {
                    dest: f(dest, Write),
                    op,
                    left,
                    right,
                }
            }
            Operation::Unary { dest, op, operand } => {
                let operand = f(operand, Read);
                Operation::Unary {
                    dest: f(dest, Write),
                    op,
                    operand,
                }
            }
            Operation::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let left = f(left, Read);
                let right = f(right, Read);
                Operation::Compare {
                    dest: f(dest, Write),
                    op,
                    left,
                    right,
                }
            }
            Operation::NewObj { dest, ctor, args: a } => {
                let a = args(a, &mut f);
                Operation::NewObj {
                    dest: f(dest, Write),
                    ctor,
                    args: a,
                }
            }
            Operation::Call {
                dest,
                method,
                args: a,
            } => {
                let a = args(a, &mut f);
                Operation::Call {
                    dest: dest.map(|d| f(d, Write)),
                    method,
                    args: a,
                }
            }
            Operation::LoadField {
                dest,
                object,
                field,
            } => {
                let object = f(object, Read);
                Operation::LoadField {
                    dest: f(dest, Write),
                    object,
                    field,
                }
            }
            Operation::StoreField {
                object,
                field,
                value,
            } => {
                let object = f(object, Read);
                Operation::StoreField {
                    object,
                    field,
                    value: f(value, Read),
                }
            }
            Operation::Pop { values } => Operation::Pop {
                values: args(values, &mut f),
            },
            Operation::Branch => Operation::Branch,
            Operation::BranchTrue { cond } => Operation::BranchTrue {
                cond: f(cond, Read),
            },
            Operation::BranchFalse { cond } => Operation::BranchFalse {
                cond: f(cond, Read),
            },
            Operation::Switch { value } => Operation::Switch {
                value: f(value, Read),
            },
            Operation::Return { value } => Operation::Return {
                value: value.map(|v| f(v, Read)),
            },
            Operation::Throw { exception } => Operation::Throw {
                exception: f(exception, Read),
            },
            Operation::EndFinally => Operation::EndFinally,
        }
    }

    pub fn dest(&self) -> Option<&V> {
        match self {
            Operation::Copy { dest, .. }
            | Operation::LoadNull { dest }
            | Operation::LoadConst { dest, .. }
            | Operation::Binary { dest, .. }
            | Operation::Unary { dest, .. }
            | Operation::Compare { dest, .. }
            | Operation::NewObj { dest, .. }
            | Operation::LoadField { dest, .. } => Some(dest),
            Operation::Call { dest, .. } => dest.as_ref(),
            _ => None,
        }
    }

    /// Variables read by the operation, in operand order.
    pub fn reads(&self) -> SmallVec<[&V; 4]> {
        let mut out = SmallVec::new();
        match self {
            Operation::Copy { source, .. } => out.push(source),
            Operation::Binary { left, right, .. } | Operation::Compare { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            Operation::Unary { operand, .. } => out.push(operand),
            Operation::NewObj { args, .. } | Operation::Call { args, .. } => out.extend(args),
            Operation::LoadField { object, .. } => out.push(object),
            Operation::StoreField { object, value, .. } => {
                out.push(object);
                out.push(value);
            }
            Operation::Pop { values } => out.extend(values),
            Operation::BranchTrue { cond: v }
            | Operation::BranchFalse { cond: v }
            | Operation::Switch { value: v }
            | Operation::Throw { exception: v } => out.push(v),
            Operation::Return { value } => out.extend(value),
            Operation::Nop
            | Operation::LoadNull { .. }
            | Operation::LoadConst { .. }
            | Operation::Branch
            | Operation::EndFinally => {}
        }
        out
    }

    /// The object whose field is accessed, if the operation dereferences one.
    pub fn dereferenced(&self) -> Option<&V> {
        match self {
            Operation::LoadField { object, .. } | Operation::StoreField { object, .. } => {
                Some(object)
            }
            _ => None,
        }
    }
}

impl<V: fmt::Display> fmt::Display for Operation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<V: fmt::Display>(f: &mut fmt::Formatter<'_>, args: &[V]) -> fmt::Result {
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            Ok(())
        }
        match self {
            Operation::Nop => write!(f, "nop"),
            Operation::Copy { dest, source } => write!(f, "{dest} = {source}"),
            Operation::LoadNull { dest } => write!(f, "{dest} = null"),
            Operation::LoadConst { dest, value } => write!(f, "{dest} = {value}"),
            Operation::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {left} {} {right}", op.symbol()),
            Operation::Unary { dest, op, operand } => {
                write!(f, "{dest} = {}{operand}", op.symbol())
            }
            Operation::Compare {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {left} {} {right}", op.symbol()),
            Operation::NewObj { dest, ctor, args } => {
                write!(f, "{dest} = new {ctor}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Operation::Call { dest, method, args } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {method}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Operation::LoadField {
                dest,
                object,
                field,
            } => write!(f, "{dest} = {object}.{field}"),
            Operation::StoreField {
                object,
                field,
                value,
            } => write!(f, "{object}.{field} = {value}"),
            Operation::Pop { values } => {
                write!(f, "pop ")?;
                list(f, values)
            }
            Operation::Branch => write!(f, "br"),
            Operation::BranchTrue { cond } => write!(f, "brtrue {cond}"),
            Operation::BranchFalse { cond } => write!(f, "brfalse {cond}"),
            Operation::Switch { value } => write!(f, "switch {value}"),
            Operation::Return { value: Some(v) } => write!(f, "ret {v}"),
            Operation::Return { value: None } => write!(f, "ret"),
            Operation::Throw { exception } => write!(f, "throw {exception}"),
            Operation::EndFinally => write!(f, "endfinally"),
        }
    }
}
