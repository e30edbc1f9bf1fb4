//! Class hierarchy recovered from vtables and constructor bodies.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use icgraph_core::FunctionId;
use icgraph_demangle::cpp::has_template_args;

/// Per-class attribute bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ClassAttrs {
    /// Raw bits.
    pub raw: u8,
}

impl ClassAttrs {
    /// Every virtual slot is the pure-virtual trap.
    pub const PURE_ABSTRACT: u8 = 0x1;
    /// The vtable has secondary sub-tables.
    pub const MULTI_INHERITANCE: u8 = 0x2;
    /// The class is a template instantiation.
    pub const TEMPLATE: u8 = 0x4;

    pub fn contains(self, bit: u8) -> bool {
        self.raw & bit != 0
    }

    pub fn insert(&mut self, bit: u8) {
        self.raw |= bit;
    }
}

/// Classes, inheritance edges in both directions and vtable slots.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: IndexSet<String>,
    /// Derived class to immediate bases.
    bases: IndexMap<String, IndexSet<String>>,
    /// Base class to immediate derived classes.
    derived: IndexMap<String, IndexSet<String>>,
    /// Vtable symbol of each class, when one was scanned.
    vtables: IndexMap<String, String>,
    /// One vector per (sub-)table, in table order.
    slots: IndexMap<String, Vec<Vec<FunctionId>>>,
    attrs: IndexMap<String, ClassAttrs>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class name. Empty names are ignored.
    pub fn add_class(&mut self, name: &str) {
        if name.is_empty() || self.classes.contains(name) {
            return;
        }
        self.classes.insert(name.to_string());
        if has_template_args(name) {
            self.set_attr(name, ClassAttrs::TEMPLATE);
        }
    }

    /// Records `derived` inheriting from `base`. Returns true if the edge
    /// is new.
    pub fn add_inheritance(&mut self, derived: &str, base: &str) -> bool {
        if derived.is_empty() || base.is_empty() || derived == base {
            return false;
        }
        self.add_class(derived);
        self.add_class(base);
        let new = self
            .bases
            .entry(derived.to_string())
            .or_default()
            .insert(base.to_string());
        self.derived
            .entry(base.to_string())
            .or_default()
            .insert(derived.to_string());
        new
    }

    pub(crate) fn set_vtable(&mut self, class: &str, symbol: &str) {
        self.add_class(class);
        self.vtables.insert(class.to_string(), symbol.to_string());
    }

    pub(crate) fn add_slots(&mut self, class: &str, slots: Vec<FunctionId>) {
        if slots.is_empty() {
            return;
        }
        self.add_class(class);
        self.slots.entry(class.to_string()).or_default().push(slots);
    }

    pub(crate) fn set_attr(&mut self, class: &str, bit: u8) {
        self.attrs.entry(class.to_string()).or_default().insert(bit);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    /// Every known class in discovery order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Immediate bases of a class.
    pub fn bases(&self, class: &str) -> impl Iterator<Item = &str> {
        self.bases
            .get(class)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Immediate derived classes of a class.
    pub fn derived(&self, class: &str) -> impl Iterator<Item = &str> {
        self.derived
            .get(class)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// `class` followed by every transitively derived class.
    pub fn descendants(&self, class: &str) -> IndexSet<String> {
        let mut seen = IndexSet::new();
        let mut worklist = vec![class.to_string()];
        while let Some(current) = worklist.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for child in self.derived(&current) {
                if !seen.contains(child) {
                    worklist.push(child.to_string());
                }
            }
        }
        seen
    }

    pub fn vtable(&self, class: &str) -> Option<&str> {
        self.vtables.get(class).map(String::as_str)
    }

    /// Slot vectors of a class, primary table first.
    pub fn slots(&self, class: &str) -> &[Vec<FunctionId>] {
        self.slots.get(class).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn attrs(&self, class: &str) -> ClassAttrs {
        self.attrs.get(class).copied().unwrap_or_default()
    }

    pub fn is_pure_abstract(&self, class: &str) -> bool {
        self.attrs(class).contains(ClassAttrs::PURE_ABSTRACT)
    }

    pub fn has_multiple_inheritance(&self, class: &str) -> bool {
        self.attrs(class).contains(ClassAttrs::MULTI_INHERITANCE)
    }

    pub fn is_template(&self, class: &str) -> bool {
        self.attrs(class).contains(ClassAttrs::TEMPLATE)
    }
}
