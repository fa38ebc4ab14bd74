use std::fmt;
use std::sync::Arc;

use covenant_ir::{Apc, Cfg, ContractProvider, MetadataProvider, MethodDef, MethodId};

use crate::{Decoder, FixpointRunner, ForwardAnalysis};

/// Everything a layer knows about the method it decodes, shared by all
/// layers of one method driver.
pub struct MethodContext {
    method: MethodId,
    cfg: Arc<Cfg>,
    metadata: Arc<dyn MetadataProvider>,
    contracts: Arc<dyn ContractProvider>,
}

impl MethodContext {
    pub fn new(
        cfg: Arc<Cfg>,
        metadata: Arc<dyn MetadataProvider>,
        contracts: Arc<dyn ContractProvider>,
    ) -> Self {
        Self {
            method: cfg.method(),
            cfg,
            metadata,
            contracts,
        }
    }

    pub fn method(&self) -> MethodId {
        self.method
    }

    pub fn cfg(&self) -> &Arc<Cfg> {
        &self.cfg
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    pub fn contracts(&self) -> &dyn ContractProvider {
        self.contracts.as_ref()
    }

    pub fn definition(&self) -> Option<&MethodDef> {
        self.metadata.method(self.method)
    }

    pub fn method_name(&self) -> String {
        self.metadata.method_name(self.method)
    }
}

impl fmt::Debug for MethodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodContext")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// A decoder bundled with its method context: the seam between the layers
/// and the analyses that run over them.
///
/// Layers are immutable once built. Building one runs nothing; analyses run
/// only through [`FixpointRunner::run`].
pub struct CodeLayer<D> {
    name: &'static str,
    decoder: Arc<D>,
    context: Arc<MethodContext>,
}

impl<D: Decoder> CodeLayer<D> {
    pub fn new(name: &'static str, decoder: Arc<D>, context: Arc<MethodContext>) -> Self {
        log::trace!("built {name} layer for {}", context.method());
        Self {
            name,
            decoder,
            context,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn decoder(&self) -> &Arc<D> {
        &self.decoder
    }

    pub fn context(&self) -> &Arc<MethodContext> {
        &self.context
    }

    pub fn cfg(&self) -> &Arc<Cfg> {
        self.decoder.cfg()
    }

    pub fn decode(&self, apc: &Apc) -> Option<crate::Operation<D::Variable>> {
        self.decoder.decode(apc)
    }

    /// Prepare a forward fixpoint of `analysis` over this layer.
    pub fn create_forward<A>(&self, analysis: A) -> FixpointRunner<'_, D, A>
    where
        A: ForwardAnalysis<D::Variable>,
    {
        FixpointRunner::new(self, analysis)
    }
}

impl<D> fmt::Debug for CodeLayer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeLayer")
            .field("name", &self.name)
            .field("method", &self.context.method())
            .finish_non_exhaustive()
    }
}
