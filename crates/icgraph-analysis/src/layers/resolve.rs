//! Layer-by-layer refinement of a call's candidate set.

use std::fmt;

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, trace};

use icgraph_core::{Program, ValueId};

use super::chain::next_layer;
use super::MultiLayerAnalysis;
use crate::strategy::CallResolver;
use crate::type_hash::{TypeHash, TypeLayer};
use crate::{FuncSet, GlobalContext};

/// Why refinement stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The first layer already had no candidates.
    EmptyBaseline,
    /// The configured number of layers was used.
    LayerLimit,
    /// A type whose outer context was lost was reached.
    Capped(TypeHash),
    /// The callee expression has no further field accesses.
    NoMoreLayers,
    /// The layer's confinement cannot be trusted.
    Escaped(TypeLayer),
    /// Intersecting with the layer left nothing; the previous set is kept.
    EmptyIntersection(TypeLayer),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyBaseline => f.write_str("empty baseline"),
            StopReason::LayerLimit => f.write_str("layer limit"),
            StopReason::Capped(ty) => write!(f, "capped at {ty}"),
            StopReason::NoMoreLayers => f.write_str("no more layers"),
            StopReason::Escaped(layer) => write!(f, "escaped at {layer}"),
            StopReason::EmptyIntersection(layer) => write!(f, "empty intersection at {layer}"),
        }
    }
}

/// Candidates after one applied layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementStep {
    pub layer: TypeLayer,
    pub targets: FuncSet,
}

/// Full record of one call's resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerResolution {
    /// First-layer (signature) candidates.
    pub baseline: FuncSet,
    /// Each layer that narrowed the set, innermost first.
    pub steps: Vec<RefinementStep>,
    pub stop: StopReason,
    /// Final answer: the last step's targets, or the baseline.
    pub targets: FuncSet,
}

impl LayerResolution {
    /// Number of layers applied beyond the signature.
    pub fn layers_used(&self) -> usize {
        self.steps.len()
    }
}

impl<R: CallResolver> MultiLayerAnalysis<R> {
    /// Confined plus propagated functions of a layer, cached.
    fn matched_targets(&mut self, layer: TypeLayer) -> FuncSet {
        if let Some(cached) = self.matched.get(&layer) {
            return cached.clone();
        }
        let set = self.facts.matched_targets(layer);
        self.matched.insert(layer, set.clone());
        set
    }

    /// Resolves an indirect call and reports every refinement step.
    pub fn resolve_layers(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> LayerResolution {
        let baseline = self.inner.resolve_indirect(program, ctx, call);
        let mut resolution = LayerResolution {
            targets: baseline.clone(),
            baseline,
            steps: Vec::new(),
            stop: StopReason::EmptyBaseline,
        };
        if resolution.baseline.is_empty() {
            return resolution;
        }
        let Some(site) = program.call_site(call) else {
            return resolution;
        };

        let types = program.types();
        let mut prev = ctx.types.hash(types, site.fn_ty());
        let mut current = site.callee();
        let mut layer_no = 1usize;
        let mut visited = FxHashSet::default();

        resolution.stop = 'walk: loop {
            if layer_no >= self.max_type_layer {
                break StopReason::LayerLimit;
            }
            if self.facts.is_capped(prev) {
                break StopReason::Capped(prev);
            }
            let step = next_layer(program, current, &mut visited);
            if step.layers.is_empty() {
                break StopReason::NoMoreLayers;
            }

            for (ty, field) in step.layers {
                if layer_no >= self.max_type_layer {
                    break 'walk StopReason::LayerLimit;
                }
                let layer = ctx.types.layer(types, ty, field);
                if self.facts.is_escaped(layer) {
                    break 'walk StopReason::Escaped(layer);
                }
                let matched = self.matched_targets(layer);
                let narrowed: FuncSet = resolution
                    .targets
                    .iter()
                    .filter(|f| matched.contains(*f))
                    .copied()
                    .collect();
                if narrowed.is_empty() {
                    break 'walk StopReason::EmptyIntersection(layer);
                }
                if self.debug {
                    trace!(layer = %layer, targets = narrowed.len(), "layer applied");
                }
                resolution.targets = narrowed;
                resolution.steps.push(RefinementStep {
                    layer,
                    targets: resolution.targets.clone(),
                });
                if self.facts.is_capped(layer.ty) {
                    break 'walk StopReason::Capped(layer.ty);
                }
                layer_no += 1;
                prev = layer.ty;
            }

            match step.next {
                Some(next) => current = next,
                None => break StopReason::NoMoreLayers,
            }
        };

        let stats = ctx.stats_mut();
        if resolution.steps.is_empty() {
            stats.num_first_layer_type_calls += 1;
            stats.num_first_layer_targets += resolution.baseline.len();
        } else {
            stats.num_second_layer_type_calls += 1;
            stats.num_second_layer_targets += resolution.targets.len();
        }
        if self.debug {
            debug!(
                call = %program.value_label(call),
                baseline = resolution.baseline.len(),
                targets = resolution.targets.len(),
                layers = resolution.layers_used(),
                stop = %resolution.stop,
                "indirect call refined"
            );
        }
        resolution
    }
}
