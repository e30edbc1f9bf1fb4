//! Vtable scanning.
//!
//! An Itanium vtable global is initialized with one array per (sub-)table:
//!
//! ```text
//! single:    { [null, _ZTI1B, B::f, B::g] }
//! multiple:  { [null, _ZTI1C, ..., inttoptr -8, _ZTI1C, ...] }
//! virtual:   { [null, _ZTI1D, ..., inttoptr -8, _ZTI1D, null, null, ...] }
//! ```
//!
//! An integer entry ends one logical table and starts the next. A run of
//! nulls right after a typeinfo entry marks a virtual base, and its length
//! pads the front of the slot vector.

use tracing::warn;

use icgraph_core::{CastOp, Constant, FunctionId, ModuleId, Program, ValueId};
use icgraph_demangle::cpp::{class_name_from_vtable, thunk_kind};
use icgraph_demangle::{MethodName, PURE_VIRTUAL};

use super::hierarchy::{ClassAttrs, ClassHierarchy};

/// Shape of one vtable entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Null,
    /// Offset-to-top or virtual-base offset.
    Offset,
    Function(FunctionId),
    TypeInfo,
    Unknown,
}

fn classify(program: &Program, entry: ValueId) -> Entry {
    if let Some((CastOp::IntToPtr, _)) = program.as_cast(entry) {
        return Entry::Offset;
    }
    let stripped = program.strip_pointer_casts(entry);
    let value = program.value(stripped);
    if let Some(f) = value.as_function() {
        return Entry::Function(f);
    }
    if let Some(g) = value.as_global() {
        if program.global(g).is_typeinfo() {
            return Entry::TypeInfo;
        }
    }
    match value.as_constant() {
        Some(Constant::Null) => Entry::Null,
        Some(Constant::Int(_)) => Entry::Offset,
        _ => Entry::Unknown,
    }
}

fn aggregate_elements(program: &Program, v: ValueId) -> Option<&[ValueId]> {
    match program.value(v).as_constant()? {
        Constant::Aggregate(elements) => Some(elements),
        _ => None,
    }
}

/// The arrays of a vtable initializer. A `{ { arrays.. }, [..] }` wrapper
/// is unwrapped, and a bare array is its own single table.
fn vtable_arrays(program: &Program, init: ValueId) -> Vec<ValueId> {
    let types = program.types();
    let Some(mut elements) = aggregate_elements(program, init) else {
        return Vec::new();
    };
    if let [inner, trailing] = elements {
        if types.is_struct(program.ty(*inner))
            && !types.is_struct(program.ty(*trailing))
            && types.is_composite(program.ty(*trailing))
        {
            if let Some(unwrapped) = aggregate_elements(program, *inner) {
                elements = unwrapped;
            }
        }
    }
    let arrays: Vec<ValueId> = elements
        .iter()
        .copied()
        .filter(|&e| aggregate_elements(program, e).is_some())
        .collect();
    if arrays.is_empty() {
        vec![init]
    } else {
        arrays
    }
}

/// Target of a `this`-adjusting thunk: the last direct call in its body.
pub fn thunk_target(program: &Program, thunk: FunctionId) -> Option<FunctionId> {
    program
        .call_sites(thunk)
        .filter_map(|site| program.base_function(site.callee()))
        .last()
}

/// Scans the vtables of one module into `hierarchy`. Returns the number of
/// vtables read.
pub fn scan_vtables(program: &Program, module: ModuleId, hierarchy: &mut ClassHierarchy) -> usize {
    let mut scanned = 0;
    for &id in &program.module(module).globals {
        let global = program.global(id);
        if !global.is_vtable() {
            continue;
        }
        let Some(init) = global.initializer else {
            continue;
        };
        let Some(class) = class_name_from_vtable(&global.name) else {
            warn!(vtable = %global.name, "vtable symbol does not demangle");
            continue;
        };
        hierarchy.set_vtable(&class, &global.name);
        scanned += 1;

        let mut has_function = false;
        let mut pure_abstract = true;
        for array in vtable_arrays(program, init) {
            let Some(entries) = aggregate_elements(program, array) else {
                warn!(vtable = %global.name, "vtable element is not an array");
                continue;
            };
            let kinds: Vec<Entry> = entries.iter().map(|&e| classify(program, e)).collect();

            let mut i = 0;
            while i < kinds.len() {
                let mut slots = Vec::new();
                let mut virtual_base = false;
                let mut null_run = 0;
                while i < kinds.len() {
                    match kinds[i] {
                        Entry::Null => {
                            if i > 0 && kinds[i - 1] == Entry::TypeInfo {
                                virtual_base = true;
                                null_run =
                                    kinds[i..].iter().take_while(|&&k| k == Entry::Null).count();
                            }
                        }
                        Entry::Offset => {
                            hierarchy.set_attr(&class, ClassAttrs::MULTI_INHERITANCE);
                            i += 1;
                            break;
                        }
                        Entry::Function(f) => {
                            let name = &program.function(f).name;
                            has_function = true;
                            pure_abstract &= name == PURE_VIRTUAL;
                            if thunk_kind(name).is_some() {
                                match thunk_target(program, f) {
                                    Some(target) => slots.push(target),
                                    None => warn!(thunk = %name, "thunk without a direct call"),
                                }
                            } else {
                                slots.push(f);
                            }
                            if let Some(method) = MethodName::parse(name) {
                                hierarchy.add_inheritance(&class, &method.class_name);
                            }
                        }
                        Entry::TypeInfo => {}
                        Entry::Unknown => {
                            warn!(
                                vtable = %global.name,
                                index = i,
                                entry = %program.value_label(entries[i]),
                                "unexpected vtable entry skipped"
                            );
                        }
                    }
                    i += 1;
                }

                if virtual_base && !slots.is_empty() {
                    for j in 0..null_run {
                        if let Some(&f) = slots.get(j) {
                            slots.insert(0, f);
                        }
                    }
                }
                hierarchy.add_slots(&class, slots);
            }
        }
        if has_function && pure_abstract {
            hierarchy.set_attr(&class, ClassAttrs::PURE_ABSTRACT);
        }
    }
    scanned
}
