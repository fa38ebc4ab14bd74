use std::ops::Range;

use crate::{Instruction, Offset, TypeId};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum HandlerKind {
    /// Catch clause; `None` catches every exception.
    Catch(Option<TypeId>),
    Finally,
    Fault,
}

impl HandlerKind {
    /// Stack height on entry to the handler: catch clauses receive the
    /// exception object.
    pub fn entry_height(self) -> usize {
        match self {
            HandlerKind::Catch(_) => 1,
            HandlerKind::Finally | HandlerKind::Fault => 0,
        }
    }

    /// Whether direct exceptional edges stop at this handler. Finally and
    /// fault handlers resume propagation themselves once they complete.
    pub fn stops_propagation(self) -> bool {
        matches!(
            self,
            HandlerKind::Catch(None) | HandlerKind::Finally | HandlerKind::Fault
        )
    }
}

/// A protected range and the handler guarding it. Both ranges are
/// half-open instruction offset ranges.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ExceptionRegion {
    pub try_range: Range<u32>,
    pub handler_range: Range<u32>,
    pub kind: HandlerKind,
}

impl ExceptionRegion {
    pub fn new(try_range: Range<u32>, handler_range: Range<u32>, kind: HandlerKind) -> Self {
        Self {
            try_range,
            handler_range,
            kind,
        }
    }

    pub fn protects(&self, offset: Offset) -> bool {
        self.try_range.contains(&offset.raw())
    }

    pub fn handles(&self, offset: Offset) -> bool {
        self.handler_range.contains(&offset.raw())
    }
}

/// Instructions and exception regions of one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodBody {
    pub instructions: Vec<Instruction>,
    pub regions: Vec<ExceptionRegion>,
    /// Parameter count, receiver included.
    pub params: u16,
    pub locals: u16,
    pub returns_value: bool,
}

#[bon::bon]
impl MethodBody {
    #[builder(finish_fn = new)]
    pub fn new(
        /// The instruction stream.
        instructions: Vec<Instruction>,
        /// Exception-handling regions, in any order.
        regions: Option<Vec<ExceptionRegion>>,
        /// Parameter count, receiver included.
        params: Option<u16>,
        /// Local variable count.
        locals: Option<u16>,
        /// Whether `ret` pops a return value.
        returns_value: Option<bool>,
    ) -> Self {
        Self {
            instructions,
            regions: regions.unwrap_or_default(),
            params: params.unwrap_or(0),
            locals: locals.unwrap_or(0),
            returns_value: returns_value.unwrap_or(false),
        }
    }
}

impl MethodBody {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, offset: Offset) -> Option<&Instruction> {
        self.instructions.get(offset.index())
    }
}

/// Everything the metadata provider knows about a method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub declaring_type: TypeId,
    pub is_static: bool,
    pub is_constructor: bool,
    /// Names of the parameters, receiver included for instance methods.
    pub param_names: Vec<String>,
    pub body: Option<MethodBody>,
}

#[bon::bon]
impl MethodDef {
    #[builder(finish_fn = new)]
    pub fn new(
        #[builder(into)] name: String,
        /// Defaults to `T0`.
        declaring_type: Option<TypeId>,
        is_static: Option<bool>,
        is_constructor: Option<bool>,
        /// Parameter names, receiver first for instance methods.
        param_names: Option<Vec<String>>,
        /// `None` for abstract or external methods.
        body: Option<MethodBody>,
    ) -> Self {
        Self {
            name,
            declaring_type: declaring_type.unwrap_or(TypeId::new(0)),
            is_static: is_static.unwrap_or(false),
            is_constructor: is_constructor.unwrap_or(false),
            param_names: param_names.unwrap_or_default(),
            body,
        }
    }
}

impl MethodDef {
    pub fn param_name(&self, index: u16) -> Option<&str> {
        self.param_names.get(usize::from(index)).map(String::as_str)
    }

    pub fn param_named(&self, name: &str) -> Option<u16> {
        self.param_names
            .iter()
            .position(|p| p == name)
            .and_then(|i| u16::try_from(i).ok())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub declaring_type: TypeId,
}
