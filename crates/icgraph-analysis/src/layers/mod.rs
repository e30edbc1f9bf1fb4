//! Multi-layer type analysis.
//!
//! Function addresses stored into fields of composite objects are
//! *confined* to the `(type, field)` layers the store target was derived
//! from. Copies between fields *propagate* confinement from one layer to
//! another, and stores the analysis cannot follow *escape* a layer. An
//! indirect call is resolved by walking its callee expression back through
//! the same layers and intersecting the signature-matched candidates with
//! each layer's functions, innermost layer first.
//!
//! With the data-flow refinement enabled, a store of a function pointer
//! that can be traced back to its definitions (see [`crate::dataflow`])
//! confines the traced functions instead of escaping the layer.

mod chain;
mod confine;
mod facts;
mod propagate;
mod resolve;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use icgraph_core::{ModuleId, Program, ValueId};

pub use chain::{base_type, gep_layers, next_layer, type_chain, LayerStep, RawLayer, TypeChain};
pub use facts::LayerFacts;
pub use resolve::{LayerResolution, RefinementStep, StopReason};

use crate::dataflow::ArgumentFlow;
use crate::strategy::CallResolver;
use crate::type_hash::TypeLayer;
use crate::{FuncSet, GlobalContext};

/// Layer-refining decorator over a first-layer resolver.
#[derive(Debug)]
pub struct MultiLayerAnalysis<R> {
    inner: R,
    max_type_layer: usize,
    dataflow: bool,
    debug: bool,
    facts: LayerFacts,
    /// Raw `i8*` call results to the single cast giving them a struct type.
    aliases: IndexMap<ValueId, ValueId>,
    /// Match cache for the main phase.
    matched: IndexMap<TypeLayer, FuncSet>,
    flow: Option<ArgumentFlow>,
    /// Stores whose function-pointer value was traced to its definitions.
    non_escape_stores: IndexSet<ValueId>,
    initialized_modules: usize,
}

impl<R: CallResolver> MultiLayerAnalysis<R> {
    pub fn new(inner: R, max_type_layer: usize) -> Self {
        Self {
            inner,
            max_type_layer: max_type_layer.max(1),
            dataflow: false,
            debug: false,
            facts: LayerFacts::new(),
            aliases: IndexMap::new(),
            matched: IndexMap::new(),
            flow: None,
            non_escape_stores: IndexSet::new(),
            initialized_modules: 0,
        }
    }

    /// Enables tracing of stored function pointers.
    pub fn with_dataflow(mut self, enabled: bool) -> Self {
        self.dataflow = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn facts(&self) -> &LayerFacts {
        &self.facts
    }

    pub fn max_type_layer(&self) -> usize {
        self.max_type_layer
    }

    pub fn is_dataflow(&self) -> bool {
        self.dataflow
    }

    /// Parameter flow, once computed by the data-flow refinement.
    pub fn argument_flow(&self) -> Option<&ArgumentFlow> {
        self.flow.as_ref()
    }

    /// Stores kept confined by the data-flow refinement.
    pub fn non_escape_stores(&self) -> &IndexSet<ValueId> {
        &self.non_escape_stores
    }

    /// Hashed layer chain of `v`. An incomplete chain caps its outermost
    /// type.
    fn hashed_chain(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        v: ValueId,
    ) -> Vec<TypeLayer> {
        let chain = type_chain(program, &self.aliases, v);
        let layers: Vec<TypeLayer> = chain
            .layers
            .iter()
            .map(|&(ty, field)| ctx.types.layer(program.types(), ty, field))
            .collect();
        if !chain.complete {
            if let Some(outer) = layers.last() {
                self.facts.cap(outer.ty);
            }
        }
        layers
    }
}

impl<R: CallResolver> CallResolver for MultiLayerAnalysis<R> {
    fn name(&self) -> &'static str {
        if self.dataflow {
            "DataflowEnhanced"
        } else {
            "MultiLayer"
        }
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        let changed = self.inner.initialize(program, ctx, module);
        if self.initialized_modules >= program.modules().len() {
            return changed;
        }
        if self.dataflow && self.flow.is_none() {
            let flow = ArgumentFlow::compute(program, ctx);
            debug!(params = flow.tracked_params(), "argument flow computed");
            self.flow = Some(flow);
        }

        let m = program.module(module);
        for &global in &m.globals {
            self.confine_initializer(program, ctx, global);
        }
        for &function in &m.functions {
            if program.function(function).is_declaration() {
                continue;
            }
            self.collect_aliases(program, function);
            self.confine_in_function(program, ctx, function);
            self.propagate_in_function(program, ctx, function);
        }

        self.initialized_modules += 1;
        if self.initialized_modules == program.modules().len() {
            self.facts.remap_functions(|f| ctx.resolve_declaration(program, f));
            debug!(
                stored = self.facts.stored_functions().len(),
                escaped = self.facts.escaped_layers().len(),
                capped = self.facts.capped_types().len(),
                non_escape_stores = self.non_escape_stores.len(),
                "type layers ready"
            );
        }
        changed
    }

    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        self.resolve_layers(program, ctx, call).targets
    }

    fn resolve_virtual(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        self.inner.resolve_virtual(program, ctx, call)
    }

    fn finalize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        self.inner.finalize(program, ctx, module)
    }
}
