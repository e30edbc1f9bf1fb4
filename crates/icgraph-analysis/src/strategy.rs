//! Resolution strategies.
//!
//! A [`CallResolver`] answers "which functions may this call reach". The
//! precision levels are layered as decorators: each one wraps a less
//! precise resolver, forwards the phases it does not refine and narrows
//! the answers of the ones it does.
//!
//! ```text
//! signature          ClassHierarchy<Signature>
//! multilayer         ClassHierarchy<MultiLayer<Signature>>
//! dataflow-enhanced  ClassHierarchy<MultiLayer<Signature> + stored-pointer tracing>
//! pointer-flow       ClassHierarchy<PointerFlow<MultiLayer<Signature> + tracing>>
//! ```

use icgraph_core::{ModuleId, Program, ValueId};

use crate::cha::ClassHierarchyAnalysis;
use crate::config::{AnalysisConfig, AnalysisKind};
use crate::layers::MultiLayerAnalysis;
use crate::pointer_flow::PointerFlowAnalysis;
use crate::signature::SignatureMatcher;
use crate::{FuncSet, GlobalContext};

/// Per-call target resolution.
pub trait CallResolver {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Gathers facts from one module. Returns true if anything changed.
    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool;

    /// Targets of a non-virtual indirect call.
    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet;

    /// Targets of a virtual call.
    fn resolve_virtual(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet;

    /// Post-processing of one module.
    fn finalize(
        &mut self,
        _program: &Program,
        _ctx: &mut GlobalContext,
        _module: ModuleId,
    ) -> bool {
        false
    }
}

impl<R: CallResolver + ?Sized> CallResolver for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        (**self).initialize(program, ctx, module)
    }

    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        (**self).resolve_indirect(program, ctx, call)
    }

    fn resolve_virtual(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        (**self).resolve_virtual(program, ctx, call)
    }

    fn finalize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        (**self).finalize(program, ctx, module)
    }
}

/// Builds the resolver stack selected by `config`.
pub fn build_resolver(config: &AnalysisConfig) -> Box<dyn CallResolver> {
    let signature = SignatureMatcher::new();
    let layers = |dataflow: bool| {
        MultiLayerAnalysis::new(signature.clone(), config.max_type_layer)
            .with_dataflow(dataflow)
            .with_debug(config.debug_mode)
    };
    let debug = config.debug_mode;
    match config.kind {
        AnalysisKind::Signature => {
            Box::new(ClassHierarchyAnalysis::new(signature.clone()).with_debug(debug))
        }
        AnalysisKind::MultiLayer => {
            Box::new(ClassHierarchyAnalysis::new(layers(false)).with_debug(debug))
        }
        AnalysisKind::DataflowEnhanced => {
            Box::new(ClassHierarchyAnalysis::new(layers(true)).with_debug(debug))
        }
        AnalysisKind::PointerFlow => Box::new(
            ClassHierarchyAnalysis::new(PointerFlowAnalysis::new(layers(true)).with_debug(debug))
                .with_debug(debug),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_names() {
        for kind in AnalysisKind::ALL {
            let resolver = build_resolver(&AnalysisConfig::new().with_kind(kind));
            assert_eq!(resolver.name(), "ClassHierarchy");
        }
    }
}
