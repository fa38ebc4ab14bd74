use std::fmt;

/// Declare a copyable index newtype with a display prefix.
///
/// The raw index is only reachable through [`raw`](BlockId::raw) so that ids
/// from different tables cannot be mixed up by accident.
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident($repr:ty) => $prefix:literal) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(pub(crate) $repr);

        impl $name {
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// return raw index
            pub const fn raw(self) -> $repr {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

identifier! {
    /// A method known to the metadata provider.
    struct MethodId(u32) => "M"
}

identifier! {
    /// A field known to the metadata provider.
    struct FieldId(u32) => "F"
}

identifier! {
    /// A type known to the metadata provider.
    struct TypeId(u32) => "T"
}

identifier! {
    /// Index of a basic block inside one [`Cfg`](crate::Cfg).
    struct BlockId(u32) => "B"
}

identifier! {
    /// Index of a handler subroutine inside one [`Cfg`](crate::Cfg).
    struct SubroutineId(u32) => "S"
}

identifier! {
    /// Instruction offset inside a method body.
    struct Offset(u32) => "IL_"
}

identifier! {
    /// A local variable slot. Locals start out as the default value.
    struct Local(u16) => "loc"
}

identifier! {
    /// A parameter slot. For instance methods `arg0` is the receiver.
    struct Param(u16) => "arg"
}
