use std::fmt;
use std::sync::Arc;

use covenant_ir::{Apc, BoxedExpression, Cfg, MethodDef, MetadataProvider};
use covenant_layer::{Decoder, Operation};

use crate::{HeapDecoder, SymExpr, SymbolicValue, ValueFacts, ValueState, Values};

/// Expressions nest at most this deep before expansion gives up.
const MAX_DEPTH: usize = 8;

/// A symbolic value named at the point where it is observed.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct LabeledSymbol {
    pub apc: Apc,
    pub value: SymbolicValue,
}

impl fmt::Display for LabeledSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.apc)
    }
}

/// Rebuilds source-level expressions from the value facts of one point.
pub(crate) struct Expander<'a> {
    heap: &'a HeapDecoder,
    metadata: &'a dyn MetadataProvider,
    def: Option<&'a MethodDef>,
    facts: &'a ValueFacts,
}

impl<'a> Expander<'a> {
    pub(crate) fn new(values: &'a Values, facts: &'a ValueFacts) -> Self {
        let context = values.analysis().context();
        Self {
            heap: values.analysis().heap(),
            metadata: context.metadata(),
            def: context.definition(),
            facts,
        }
    }

    pub(crate) fn expand(&self, v: SymbolicValue) -> Option<BoxedExpression> {
        self.expand_at(v, 0)
    }

    fn expand_at(&self, v: SymbolicValue, depth: usize) -> Option<BoxedExpression> {
        if depth > MAX_DEPTH {
            return None;
        }
        if let Some(param) = self.heap.parameter_of(v) {
            let name = self
                .def
                .and_then(|d| d.param_name(param.raw()))
                .map_or_else(|| param.to_string(), str::to_owned);
            return Some(BoxedExpression::Variable(name));
        }
        let sub = |x: SymbolicValue| self.expand_at(x, depth + 1).map(Box::new);
        Some(match self.facts.expr(v)? {
            SymExpr::Null => BoxedExpression::Null,
            SymExpr::Const(c) => BoxedExpression::Constant(*c),
            SymExpr::Binary(op, a, b) => BoxedExpression::Binary(*op, sub(*a)?, sub(*b)?),
            SymExpr::Unary(op, a) => BoxedExpression::Unary(*op, sub(*a)?),
            SymExpr::Compare(op, a, b) => BoxedExpression::Compare(*op, sub(*a)?, sub(*b)?),
            SymExpr::Field(object, field) => {
                BoxedExpression::Field(sub(*object)?, self.metadata.field_name(*field))
            }
            SymExpr::New(_) | SymExpr::Call(_) => return None,
        })
    }
}

/// The value layer with every value labeled by the point it is read or
/// written at; expressions are rebuilt from the facts of that point.
pub struct ExpressionDecoder {
    values: Arc<Values>,
}

impl ExpressionDecoder {
    pub fn new(values: Arc<Values>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &Arc<Values> {
        &self.values
    }
}

impl Decoder for ExpressionDecoder {
    type Variable = LabeledSymbol;
    type Expression = BoxedExpression;

    fn cfg(&self) -> &Arc<Cfg> {
        self.values.analysis().heap().cfg()
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<LabeledSymbol>> {
        let op = self.values.analysis().heap().decode(apc)?;
        Some(op.map(|value, _| LabeledSymbol {
            apc: apc.clone(),
            value,
        }))
    }

    fn expression(&self, _apc: &Apc, var: &LabeledSymbol) -> Option<BoxedExpression> {
        let ValueState::Reached(facts) = self.values.state(&var.apc)? else {
            return None;
        };
        Expander::new(&self.values, &facts).expand(var.value)
    }
}

impl fmt::Debug for ExpressionDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionDecoder")
            .field("values", &self.values)
            .finish()
    }
}

/// The value layer queried at arbitrary points: a value's expression is
/// whatever the facts after the queried point say about it.
pub struct HybridDecoder {
    values: Arc<Values>,
}

impl HybridDecoder {
    pub fn new(values: Arc<Values>) -> Self {
        Self { values }
    }
}

impl Decoder for HybridDecoder {
    type Variable = SymbolicValue;
    type Expression = BoxedExpression;

    fn cfg(&self) -> &Arc<Cfg> {
        self.values.analysis().heap().cfg()
    }

    fn decode(&self, apc: &Apc) -> Option<Operation<SymbolicValue>> {
        self.values.analysis().heap().decode(apc)
    }

    fn expression(&self, apc: &Apc, var: &SymbolicValue) -> Option<BoxedExpression> {
        let ValueState::Reached(facts) = self.values.post_state(apc)? else {
            return None;
        };
        Expander::new(&self.values, &facts).expand(*var)
    }
}

impl fmt::Debug for HybridDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridDecoder")
            .field("values", &self.values)
            .finish()
    }
}
