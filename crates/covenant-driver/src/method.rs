use std::cell::OnceCell;
use std::fmt::Write;
use std::sync::Arc;

use covenant_analysis::{
    ExpressionDecoder, FactBase, HeapDecoder, HybridDecoder, Values, ValueState,
};
use covenant_ir::{Apc, Cfg, MethodId};
use covenant_layer::{
    CodeLayer, ContractFreeView, Decoder, MethodContext, PrintConfig, RawDecoder, StackDecoder,
};

use crate::{AnalysisConfig, BasicAnalysisDriver, MethodError};

pub type RawLayer = CodeLayer<RawDecoder>;
pub type StackLayer = CodeLayer<StackDecoder>;
pub type ContractFreeLayer = CodeLayer<ContractFreeView<StackDecoder>>;
pub type ValueLayer = CodeLayer<HeapDecoder>;
pub type ExpressionLayer = CodeLayer<ExpressionDecoder>;
pub type HybridLayer = CodeLayer<HybridDecoder>;

/// Per-method driver kinds produced by an [`AnalysisDriver`](crate::AnalysisDriver).
pub trait MethodDriver {
    fn basic(&self) -> &BasicMethodDriver;
}

/// Results of the heap and value analyses of one method, with the layers
/// built on top of them.
pub struct AnalysisLayers {
    heap: Arc<HeapDecoder>,
    value: Arc<ValueLayer>,
    values: Arc<Values>,
    expression: Arc<ExpressionLayer>,
    hybrid: Arc<HybridLayer>,
    warnings: Vec<MethodError>,
}

impl AnalysisLayers {
    pub fn heap(&self) -> &Arc<HeapDecoder> {
        &self.heap
    }

    /// Contract-free operations over symbolic values.
    pub fn value_layer(&self) -> &Arc<ValueLayer> {
        &self.value
    }

    pub fn values(&self) -> &Arc<Values> {
        &self.values
    }

    pub fn expression_layer(&self) -> &Arc<ExpressionLayer> {
        &self.expression
    }

    pub fn hybrid_layer(&self) -> &Arc<HybridLayer> {
        &self.hybrid
    }

    pub fn fact_base(&self) -> FactBase {
        FactBase::new(self.heap.clone(), self.values.clone())
    }

    /// Divergences and contract failures met while analyzing.
    pub fn warnings(&self) -> &[MethodError] {
        &self.warnings
    }
}

impl std::fmt::Debug for AnalysisLayers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisLayers")
            .field("values", &self.values)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

/// Owns every layer of one method.
///
/// The raw and stack layers are built by [`new`](Self::new); the rest is
/// built on first use and cached for the driver's lifetime. A driver is
/// used by one thread and never reused for another method.
pub struct BasicMethodDriver {
    parent: BasicAnalysisDriver,
    context: Arc<MethodContext>,
    raw: Arc<RawLayer>,
    stack: Arc<StackLayer>,
    contract_free: OnceCell<Arc<ContractFreeLayer>>,
    layers: OnceCell<Arc<AnalysisLayers>>,
}

impl BasicMethodDriver {
    pub fn new(method: MethodId, parent: &BasicAnalysisDriver) -> Result<Self, MethodError> {
        let cfg = parent
            .cfg_builder()
            .build(method, parent.metadata().as_ref())
            .map_err(|err| MethodError::new(method, err))?;
        let cfg = Arc::new(cfg);
        let context = Arc::new(MethodContext::new(
            cfg.clone(),
            parent.metadata().clone(),
            parent.contracts().clone(),
        ));
        let raw = Arc::new(RawDecoder::new(cfg));
        let stack = StackDecoder::new(raw.clone()).map_err(|err| MethodError::new(method, err))?;
        Ok(Self {
            parent: parent.clone(),
            raw: Arc::new(CodeLayer::new("raw", raw, context.clone())),
            stack: Arc::new(CodeLayer::new("stack", Arc::new(stack), context.clone())),
            context,
            contract_free: OnceCell::new(),
            layers: OnceCell::new(),
        })
    }

    pub fn method(&self) -> MethodId {
        self.context.method()
    }

    pub fn config(&self) -> &AnalysisConfig {
        self.parent.config()
    }

    pub fn context(&self) -> &Arc<MethodContext> {
        &self.context
    }

    pub fn cfg(&self) -> &Arc<Cfg> {
        self.context.cfg()
    }

    pub fn raw_layer(&self) -> &Arc<RawLayer> {
        &self.raw
    }

    pub fn stack_layer(&self) -> &Arc<StackLayer> {
        &self.stack
    }

    /// Contract calls elided; the graph is the method's own.
    pub fn contract_free_cfg(&self) -> &Arc<Cfg> {
        self.contract_free_stack_layer().cfg()
    }

    pub fn contract_free_stack_layer(&self) -> &Arc<ContractFreeLayer> {
        self.contract_free.get_or_init(|| {
            let view = ContractFreeView::new(
                self.stack.decoder().clone(),
                self.parent.contracts().clone(),
            );
            Arc::new(CodeLayer::new(
                "contract-free stack",
                Arc::new(view),
                self.context.clone(),
            ))
        })
    }

    /// Run the heap analysis, then the value analysis over its layer, and
    /// build the expression and hybrid layers. Later calls return the
    /// layers built by the first.
    pub fn run_heap_and_expression_analyses(&self) -> &Arc<AnalysisLayers> {
        self.layers.get_or_init(|| Arc::new(self.analyze()))
    }

    /// Layers built by [`run_heap_and_expression_analyses`](Self::run_heap_and_expression_analyses), if it ran.
    pub fn analysis_layers(&self) -> Option<&Arc<AnalysisLayers>> {
        self.layers.get()
    }

    fn analyze(&self) -> AnalysisLayers {
        let config = *self.config();
        let method = self.method();
        log::debug!("analyzing {}", self.context.method_name());

        let heap = HeapDecoder::analyze(
            &**self.contract_free_stack_layer(),
            config.max_iterations,
            config.widening,
        );
        let heap = Arc::new(heap);
        let value = Arc::new(CodeLayer::new("value", heap.clone(), self.context.clone()));
        let values = Arc::new(Values::analyze(
            &value,
            config.max_iterations,
            config.widening,
        ));
        let expression = CodeLayer::new(
            "expression",
            Arc::new(ExpressionDecoder::new(values.clone())),
            self.context.clone(),
        );
        let hybrid = CodeLayer::new(
            "hybrid",
            Arc::new(HybridDecoder::new(values.clone())),
            self.context.clone(),
        );

        let mut warnings = Vec::new();
        warnings.extend(heap.divergence().cloned().map(|d| MethodError::new(method, d)));
        warnings.extend(values.divergence().cloned().map(|d| MethodError::new(method, d)));
        warnings.extend(
            values
                .contract_error()
                .cloned()
                .map(|e| MethodError::new(method, e)),
        );

        let layers = AnalysisLayers {
            heap,
            value,
            values,
            expression: Arc::new(expression),
            hybrid: Arc::new(hybrid),
            warnings,
        };
        if config.debug && log::log_enabled!(log::Level::Debug) {
            self.dump(&layers);
        }
        layers
    }

    fn dump(&self, layers: &AnalysisLayers) {
        let annotate = |apc: &Apc| describe(layers, apc);
        match layers.value_layer().render(&PrintConfig::default(), annotate) {
            Ok(text) => log::debug!("{}:\n{text}", self.context.method_name()),
            Err(err) => log::debug!("cannot render {}: {err}", self.method()),
        }
    }

    /// Divergences and contract failures, once the analyses ran.
    pub fn warnings(&self) -> &[MethodError] {
        self.layers
            .get()
            .map(|layers| layers.warnings())
            .unwrap_or(&[])
    }

    pub fn fact_base(&self) -> FactBase {
        self.run_heap_and_expression_analyses().fact_base()
    }
}

/// Facts about the values an operation reads, for the diagnostic dump.
fn describe(layers: &AnalysisLayers, apc: &Apc) -> Option<String> {
    let Some(ValueState::Reached(facts)) = layers.values().state(apc) else {
        return None;
    };
    let op = layers.heap().decode(apc)?;
    let mut note = String::new();
    for v in op.reads() {
        if !note.is_empty() {
            note.push_str(", ");
        }
        let _ = write!(note, "{v}: {}", facts.info(*v));
    }
    (!note.is_empty()).then_some(note)
}

impl MethodDriver for BasicMethodDriver {
    fn basic(&self) -> &BasicMethodDriver {
        self
    }
}

impl std::fmt::Debug for BasicMethodDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicMethodDriver")
            .field("method", &self.method())
            .field("analyzed", &self.layers.get().is_some())
            .finish_non_exhaustive()
    }
}
