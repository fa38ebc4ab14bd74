use std::fmt;

use covenant_analysis::ContractInference;
use covenant_ir::{BoxedExpression, MethodId};

use crate::method::MethodDriver;
use crate::{AnalysisDriver, BasicAnalysisDriver, BasicMethodDriver, MethodError};

/// Clauses inferred for one method.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferredContracts {
    pub preconditions: Vec<BoxedExpression>,
    pub postconditions: Vec<BoxedExpression>,
    pub object_invariants: Vec<BoxedExpression>,
}

impl InferredContracts {
    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty()
            && self.postconditions.is_empty()
            && self.object_invariants.is_empty()
    }
}

impl fmt::Display for InferredContracts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses = [
            ("requires", &self.preconditions),
            ("ensures", &self.postconditions),
            ("invariant", &self.object_invariants),
        ];
        for (keyword, list) in clauses {
            for clause in list {
                writeln!(f, "{keyword} {clause}")?;
            }
        }
        Ok(())
    }
}

/// Runs the analyses of a method and infers its contracts.
#[derive(Debug)]
pub struct InferenceMethodDriver {
    basic: BasicMethodDriver,
}

impl InferenceMethodDriver {
    pub fn new(method: MethodId, parent: &BasicAnalysisDriver) -> Result<Self, MethodError> {
        Ok(Self {
            basic: BasicMethodDriver::new(method, parent)?,
        })
    }

    /// Lazy clause queries over the analysis results, running the analyses
    /// first if needed.
    pub fn inference(&self) -> ContractInference {
        let layers = self.basic.run_heap_and_expression_analyses();
        ContractInference::new(layers.fact_base())
            .max_backward_depth(self.basic.config().max_backward_depth)
    }

    pub fn infer(&self) -> InferredContracts {
        let inference = self.inference();
        let contracts = InferredContracts {
            preconditions: inference.preconditions().collect(),
            postconditions: inference.postconditions().collect(),
            object_invariants: inference.object_invariants().collect(),
        };
        log::debug!(
            "inferred {} clauses for {}",
            contracts.preconditions.len()
                + contracts.postconditions.len()
                + contracts.object_invariants.len(),
            self.basic.context().method_name()
        );
        contracts
    }
}

impl MethodDriver for InferenceMethodDriver {
    fn basic(&self) -> &BasicMethodDriver {
        &self.basic
    }
}

/// Produces an [`InferenceMethodDriver`] per method.
#[derive(Clone, Debug)]
pub struct InferenceDriver {
    basic: BasicAnalysisDriver,
}

impl InferenceDriver {
    pub fn new(basic: BasicAnalysisDriver) -> Self {
        Self { basic }
    }
}

impl AnalysisDriver for InferenceDriver {
    type MethodDriver = InferenceMethodDriver;
    type Output = InferredContracts;

    fn basic(&self) -> &BasicAnalysisDriver {
        &self.basic
    }

    fn create_method_driver(&self, method: MethodId) -> Result<InferenceMethodDriver, MethodError> {
        InferenceMethodDriver::new(method, &self.basic)
    }

    fn analyze(&self, driver: &InferenceMethodDriver) -> InferredContracts {
        driver.infer()
    }
}
