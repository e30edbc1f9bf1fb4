//! Confinement, propagation and escape facts keyed by [`TypeLayer`].

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use icgraph_core::FunctionId;

use crate::type_hash::{FieldIndex, TypeHash, TypeLayer};
use crate::FuncSet;

/// Everything the initialization sweep learns about type layers.
#[derive(Debug, Clone, Default)]
pub struct LayerFacts {
    /// Functions stored into each field of each type.
    confined: IndexMap<TypeHash, IndexMap<FieldIndex, FuncSet>>,
    /// Destination layer to the source layers that flow into it.
    propagated: IndexMap<TypeLayer, IndexSet<TypeLayer>>,
    escaped: IndexSet<TypeLayer>,
    /// Types whose outer context was lost.
    capped: IndexSet<TypeHash>,
    /// Every function whose address was confined somewhere.
    stored: FuncSet,
}

impl LayerFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `function` may be held by `layer`.
    pub fn confine(&mut self, layer: TypeLayer, function: FunctionId) -> bool {
        self.confined
            .entry(layer.ty)
            .or_default()
            .entry(layer.field)
            .or_default()
            .insert(function)
    }

    /// Records that whatever `from` holds may flow into `to`.
    pub fn propagate(&mut self, to: TypeLayer, from: TypeLayer) -> bool {
        if to == from {
            return false;
        }
        self.propagated.entry(to).or_default().insert(from)
    }

    pub fn escape(&mut self, layer: TypeLayer) -> bool {
        self.escaped.insert(layer)
    }

    pub fn cap(&mut self, ty: TypeHash) -> bool {
        self.capped.insert(ty)
    }

    pub fn mark_stored(&mut self, function: FunctionId) -> bool {
        self.stored.insert(function)
    }

    /// True if the layer itself or the whole type escaped.
    pub fn is_escaped(&self, layer: TypeLayer) -> bool {
        self.escaped.contains(&layer) || self.escaped.contains(&layer.whole())
    }

    pub fn is_capped(&self, ty: TypeHash) -> bool {
        self.capped.contains(&ty)
    }

    pub fn stored_functions(&self) -> &FuncSet {
        &self.stored
    }

    pub fn escaped_layers(&self) -> &IndexSet<TypeLayer> {
        &self.escaped
    }

    pub fn capped_types(&self) -> &IndexSet<TypeHash> {
        &self.capped
    }

    /// Functions confined to `layer` itself.
    ///
    /// A specific field also sees functions confined to the whole type;
    /// the whole type sees every field.
    pub fn targets(&self, layer: TypeLayer) -> FuncSet {
        let Some(fields) = self.confined.get(&layer.ty) else {
            return FuncSet::new();
        };
        match layer.field {
            FieldIndex::All => fields.values().flatten().copied().collect(),
            field => {
                let mut set = fields.get(&field).cloned().unwrap_or_default();
                if let Some(whole) = fields.get(&FieldIndex::All) {
                    set.extend(whole.iter().copied());
                }
                set
            }
        }
    }

    /// Layers whose functions may reach `layer` through propagation,
    /// transitively, in breadth-first order.
    pub fn dependent_layers(&self, layer: TypeLayer) -> IndexSet<TypeLayer> {
        let mut found = IndexSet::new();
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::from([layer]);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for key in [current, current.whole()] {
                if let Some(sources) = self.propagated.get(&key) {
                    for &source in sources {
                        found.insert(source);
                        queue.push_back(source);
                    }
                }
            }
        }
        found
    }

    /// Functions confined to `layer` or propagated into it.
    pub fn matched_targets(&self, layer: TypeLayer) -> FuncSet {
        let mut set = self.targets(layer);
        for dependent in self.dependent_layers(layer) {
            set.extend(self.targets(dependent));
        }
        set
    }

    /// Replaces every confined function by `map(function)`.
    pub fn remap_functions(&mut self, mut map: impl FnMut(FunctionId) -> FunctionId) {
        for fields in self.confined.values_mut() {
            for set in fields.values_mut() {
                *set = set.iter().map(|&f| map(f)).collect();
            }
        }
        self.stored = self.stored.iter().map(|&f| map(f)).collect();
    }
}
