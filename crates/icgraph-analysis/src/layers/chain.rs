//! Backward walks from a pointer to the composite types it was derived from.
//!
//! A *layer* is one `(container type, field)` step. Walking the callee
//! expression `a->b.c` backward yields `(B, c)` then `(A, b)`: innermost
//! first. All walks use explicit stacks and a visited set, so recursive
//! phi graphs terminate and deep chains cannot exhaust the call stack.

use std::collections::VecDeque;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use icgraph_core::{CastOp, GepView, Opcode, Program, TypeId, ValueId, ValueKind};

use crate::type_hash::FieldIndex;

/// A layer before hashing.
pub type RawLayer = (TypeId, FieldIndex);

/// Result of one [`next_layer`] step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStep {
    /// Layers of the GEP that was reached, innermost first.
    pub layers: Vec<RawLayer>,
    /// Where the walk stopped: the GEP base when `found`, otherwise the
    /// last value reached if it is a root (argument, stack slot, global)
    /// and `None` for values the walk cannot see through.
    pub next: Option<ValueId>,
    /// A GEP was reached.
    pub found: bool,
}

/// A full backward chain with its completeness verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeChain {
    pub layers: Vec<RawLayer>,
    /// False when the chain's origin could still be reached from outside:
    /// an unknown value, a pointer parameter, or a slot that is itself
    /// overwritten.
    pub complete: bool,
}

/// Stack slots and globals end a walk without losing the origin.
fn is_root(program: &Program, id: ValueId) -> bool {
    match &program.value(id).kind {
        ValueKind::Argument { .. } | ValueKind::Global(_) => true,
        ValueKind::Instruction(inst) => matches!(inst.opcode, Opcode::Alloca { .. }),
        _ => false,
    }
}

/// Walks back from `start` through loads, bitcasts, phis, selects and
/// unary operations to the nearest GEP and returns its layers.
///
/// Phi nodes try their incoming values in order and the first branch
/// that reaches a GEP wins.
pub fn next_layer(
    program: &Program,
    start: ValueId,
    visited: &mut FxHashSet<ValueId>,
) -> LayerStep {
    let mut stack = vec![start];
    let mut next = Some(start);

    while let Some(v) = stack.pop() {
        if program.value(v).is_argument() || !visited.insert(v) {
            next = Some(v);
            continue;
        }
        if let Some(gep) = program.as_gep(v) {
            return LayerStep {
                layers: gep_layers(program, v, gep),
                next: Some(gep.base),
                found: true,
            };
        }
        match program.opcode(v) {
            Some(Opcode::Load { ptr }) => stack.push(*ptr),
            Some(Opcode::Select { if_true, .. }) => stack.push(*if_true),
            Some(Opcode::Phi { incoming }) => stack.extend(incoming.iter().rev().copied()),
            Some(Opcode::Unary { operand }) => stack.push(*operand),
            _ => match program.as_cast(v) {
                Some((CastOp::BitCast, operand)) => stack.push(operand),
                _ => next = is_root(program, v).then_some(v),
            },
        }
    }

    LayerStep {
        layers: Vec::new(),
        next,
        found: false,
    }
}

/// Layers selected by a GEP's indices, innermost first.
///
/// The first index steps over the base pointer and selects no field. A
/// GEP whose result is reinterpreted as a pointer to the first field of
/// the struct it addresses also yields `(struct, 0)`, since field 0 shares
/// the struct's address.
pub fn gep_layers(program: &Program, gep_id: ValueId, gep: GepView<'_>) -> Vec<RawLayer> {
    let types = program.types();
    let mut layers = VecDeque::new();
    let mut ety = gep.source_ty;

    for &index in gep.indices.iter().skip(1) {
        layers.push_front((ety, FieldIndex::from_gep(index)));
        match types.element_type(ety, index.as_const()) {
            Some(sub) => ety = sub,
            None => break,
        }
    }

    if let Some(&first) = types.struct_fields(ety).and_then(|fields| fields.first()) {
        let reinterpreted = program.users(gep_id).iter().any(|&user| {
            matches!(program.as_cast(user), Some((CastOp::BitCast, _)))
                && types.pointee(program.ty(user)) == Some(first)
        });
        if reinterpreted {
            layers.push_front((ety, FieldIndex::At(0)));
        }
    }

    layers.into()
}

/// Composite type `v` points into without descending a layer.
///
/// `aliases` maps raw `i8*` call results to the cast that gives them a
/// struct type.
pub fn base_type(
    program: &Program,
    aliases: &IndexMap<ValueId, ValueId>,
    v: ValueId,
) -> Option<TypeId> {
    let types = program.types();
    let mut stack = vec![v];
    let mut visited = FxHashSet::default();

    while let Some(v) = stack.pop() {
        if !visited.insert(v) {
            continue;
        }
        let ty = program.ty(v);
        if types.is_composite(ty) {
            return Some(ty);
        }
        if let Some(pointee) = types.pointee(ty) {
            if types.is_composite(pointee) {
                return Some(pointee);
            }
            let aliased = aliases.get(&v).and_then(|&cast| types.pointee(program.ty(cast)));
            if let Some(pointee) = aliased {
                return Some(pointee);
            }
        }
        match program.opcode(v) {
            Some(Opcode::Select { if_true, .. }) => stack.push(*if_true),
            Some(Opcode::Phi { incoming }) => stack.extend(incoming.iter().rev().copied()),
            Some(Opcode::Load { ptr }) => stack.push(*ptr),
            _ => {
                if let Some((CastOp::BitCast, operand)) = program.as_cast(v) {
                    stack.push(operand);
                }
            }
        }
    }
    None
}

/// Every layer `v` may be nested in, innermost first.
///
/// A pointer to a composite type contributes `(type, 0)` up front, then
/// [`next_layer`] is applied until no further GEP is found.
pub fn type_chain(
    program: &Program,
    aliases: &IndexMap<ValueId, ValueId>,
    v: ValueId,
) -> TypeChain {
    let mut layers = Vec::new();
    if let Some(ty) = base_type(program, aliases, v) {
        layers.push((ty, FieldIndex::At(0)));
    }

    let mut visited = FxHashSet::default();
    let mut current = v;
    let end = loop {
        let step = next_layer(program, current, &mut visited);
        layers.extend(step.layers);
        match step.next {
            Some(next) if step.found => current = next,
            next => break next,
        }
    };

    let complete = match end {
        None => false,
        Some(root) => {
            let opaque_param =
                program.value(root).is_argument() && program.types().is_pointer(program.ty(root));
            let overwritten = program.users(root).iter().any(|&user| {
                program
                    .instruction(user)
                    .and_then(|inst| inst.as_store())
                    .is_some_and(|(_, ptr)| ptr == root)
            });
            !opaque_param && !overwritten
        }
    };

    TypeChain { layers, complete }
}
