use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use covenant_ir::{Apc, Cfg};

use crate::Operation;

/// Replays a method's instructions as [`Operation`]s over the layer's
/// variables.
///
/// A decoder wraps the decoder of the layer below it and nothing else; all
/// decoders of one method share the same [`Cfg`].
pub trait Decoder {
    type Variable: Clone + Eq + Hash + fmt::Debug + fmt::Display;
    type Expression: fmt::Display;

    fn cfg(&self) -> &Arc<Cfg>;

    /// Operation at a program point; `None` for synthetic exit points and,
    /// in analysis-backed layers, for points no state reaches.
    fn decode(&self, apc: &Apc) -> Option<Operation<Self::Variable>>;

    /// What a variable stands for at a program point.
    fn expression(&self, apc: &Apc, var: &Self::Variable) -> Option<Self::Expression>;
}
