use std::sync::Arc;

use covenant_ir::{ContractProvider, MetadataProvider, MethodId, SubroutineFacade};
use indexmap::IndexMap;

use crate::method::{AnalysisLayers, MethodDriver};
use crate::{AnalysisConfig, BasicMethodDriver, MethodError};

/// State shared by every method of a run: the providers, the graph
/// builder and the configuration.
///
/// Cloning is cheap and clones share the providers, so one driver can hand
/// out method drivers on several threads.
#[derive(Clone)]
pub struct BasicAnalysisDriver {
    metadata: Arc<dyn MetadataProvider>,
    contracts: Arc<dyn ContractProvider>,
    cfg_builder: SubroutineFacade,
    config: AnalysisConfig,
}

#[bon::bon]
impl BasicAnalysisDriver {
    #[builder(finish_fn = new)]
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        contracts: Arc<dyn ContractProvider>,
        /// Defaults to [`AnalysisConfig::default`].
        config: Option<AnalysisConfig>,
    ) -> Self {
        Self {
            metadata,
            contracts,
            cfg_builder: SubroutineFacade,
            config: config.unwrap_or_default(),
        }
    }
}

impl BasicAnalysisDriver {
    pub fn metadata(&self) -> &Arc<dyn MetadataProvider> {
        &self.metadata
    }

    pub fn contracts(&self) -> &Arc<dyn ContractProvider> {
        &self.contracts
    }

    pub fn cfg_builder(&self) -> &SubroutineFacade {
        &self.cfg_builder
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}

impl std::fmt::Debug for BasicAnalysisDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAnalysisDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Outcome of one method in a batch.
#[derive(Debug)]
pub enum MethodOutcome<T> {
    Analyzed {
        output: T,
        /// Divergences and contract failures; the output is still sound.
        warnings: Vec<MethodError>,
    },
    Skipped(MethodError),
}

impl<T> MethodOutcome<T> {
    pub fn output(&self) -> Option<&T> {
        match self {
            MethodOutcome::Analyzed { output, .. } => Some(output),
            MethodOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, MethodOutcome::Skipped(_))
    }
}

/// Outcomes of a batch, in the order the methods were requested.
#[derive(Debug)]
pub struct BatchReport<T> {
    outcomes: IndexMap<MethodId, MethodOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn get(&self, method: MethodId) -> Option<&MethodOutcome<T>> {
        self.outcomes.get(&method)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MethodId, &MethodOutcome<T>)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn analyzed(&self) -> impl Iterator<Item = (&MethodId, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(m, outcome)| outcome.output().map(|o| (m, o)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &MethodError> {
        self.outcomes.values().filter_map(|outcome| match outcome {
            MethodOutcome::Skipped(err) => Some(err),
            MethodOutcome::Analyzed { .. } => None,
        })
    }

    /// Every warning of every analyzed method.
    pub fn warnings(&self) -> impl Iterator<Item = &MethodError> {
        self.outcomes.values().flat_map(|outcome| match outcome {
            MethodOutcome::Analyzed { warnings, .. } => warnings.as_slice(),
            MethodOutcome::Skipped(_) => &[][..],
        })
    }
}

/// Produces the method driver kind an analysis needs, one per method, all
/// sharing the same [`BasicAnalysisDriver`].
pub trait AnalysisDriver {
    type MethodDriver: MethodDriver;
    type Output;

    fn basic(&self) -> &BasicAnalysisDriver;

    fn create_method_driver(&self, method: MethodId) -> Result<Self::MethodDriver, MethodError>;

    fn analyze(&self, driver: &Self::MethodDriver) -> Self::Output;

    /// Analyze every method in order. A failing method is recorded and
    /// skipped; no per-method error stops the batch.
    fn run_batch(&self, methods: impl IntoIterator<Item = MethodId>) -> BatchReport<Self::Output> {
        let mut outcomes = IndexMap::new();
        for method in methods {
            let outcome = match self.create_method_driver(method) {
                Ok(driver) => {
                    let output = self.analyze(&driver);
                    let warnings = driver.basic().warnings().to_vec();
                    MethodOutcome::Analyzed { output, warnings }
                }
                Err(err) => {
                    log::warn!("skipping {err}");
                    MethodOutcome::Skipped(err)
                }
            };
            outcomes.insert(method, outcome);
        }
        BatchReport { outcomes }
    }
}

impl AnalysisDriver for BasicAnalysisDriver {
    type MethodDriver = BasicMethodDriver;
    type Output = Arc<AnalysisLayers>;

    fn basic(&self) -> &BasicAnalysisDriver {
        self
    }

    fn create_method_driver(&self, method: MethodId) -> Result<BasicMethodDriver, MethodError> {
        BasicMethodDriver::new(method, self)
    }

    fn analyze(&self, driver: &BasicMethodDriver) -> Arc<AnalysisLayers> {
        driver.run_heap_and_expression_analyses().clone()
    }
}
