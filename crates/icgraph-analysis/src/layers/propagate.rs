//! Propagation and escape: copies between layers and stores the analysis
//! cannot follow.

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use icgraph_core::{CastOp, Constant, FunctionId, Opcode, Program, Type, TypeId, ValueId};

use super::chain::{base_type, next_layer};
use super::MultiLayerAnalysis;
use crate::strategy::CallResolver;
use crate::type_hash::{FieldIndex, TypeLayer};
use crate::GlobalContext;

/// Struct-copy intrinsics (`llvm.memcpy.p0i8.p0i8.i64`, ...).
const MEMCPY_PREFIX: &str = "llvm.memcpy";

/// Strips every pointer level off `ty`.
fn innermost_pointee(program: &Program, mut ty: TypeId) -> TypeId {
    let types = program.types();
    let mut depth = 0;
    while let Some(pointee) = types.pointee(ty) {
        ty = pointee;
        depth += 1;
        if depth > types.len() {
            break;
        }
    }
    ty
}

fn is_untyped(program: &Program, ty: TypeId) -> bool {
    matches!(program.types().get(ty), Type::Void | Type::Integer { .. })
}

impl<R: CallResolver> MultiLayerAnalysis<R> {
    /// Records propagation for every store and struct copy in `function`,
    /// then caps types reinterpreted by casts.
    pub(super) fn propagate_in_function(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        function: FunctionId,
    ) {
        let mut casts = IndexSet::new();

        for inst in program.function(function).instructions() {
            let copy = match program.opcode(inst) {
                Some(Opcode::Store { value, ptr }) => Some((*ptr, *value)),
                Some(Opcode::Call(call)) => program
                    .base_function(call.callee)
                    .filter(|&f| program.function(f).name.starts_with(MEMCPY_PREFIX))
                    .and_then(|_| Some((*call.args.first()?, *call.args.get(1)?))),
                _ => None,
            };
            if let Some((ptr, value)) = copy {
                self.propagate_store(program, ctx, inst, ptr, value);
            }

            if program.as_cast(inst).is_some() {
                casts.insert(inst);
            }
            for operand in program.value(inst).operands() {
                if program.value(operand).is_constant()
                    && matches!(program.as_cast(operand), Some((CastOp::BitCast, _)))
                {
                    casts.insert(operand);
                }
            }
        }

        for cast in casts {
            self.handle_cast(program, ctx, cast);
        }
    }

    /// `*ptr = value`, or a struct copy from `value` into `ptr`.
    fn propagate_store(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        store: ValueId,
        ptr: ValueId,
        value: ValueId,
    ) {
        if let Some(constant) = program.value(value).as_constant() {
            if constant.is_data() || matches!(constant, Constant::Aggregate(_)) {
                return;
            }
        }
        let types = program.types();

        let step = next_layer(program, value, &mut FxHashSet::default());
        if !step.layers.is_empty() {
            for (ty, field) in step.layers {
                let from = ctx.types.layer(types, ty, field);
                self.propagate_type(program, ctx, ptr, from);
            }
            return;
        }

        if let Some(base) = base_type(program, &self.aliases, value) {
            let from = ctx.types.layer(types, base, FieldIndex::All);
            self.propagate_type(program, ctx, ptr, from);
            return;
        }

        let stripped = program.strip_pointer_casts(value);
        if let Some(fn_ty) = types.function_pointee(program.ty(stripped)) {
            if program.base_function(value).is_none() {
                let from = ctx.types.layer(types, fn_ty, FieldIndex::All);
                self.propagate_type(program, ctx, ptr, from);
                self.escape_function_pointer(program, ctx, ptr, store);
            }
            return;
        }

        if types.is_pointer(program.ty(value)) {
            self.escape_type(program, ctx, ptr);
        }
    }

    /// Every layer of `to` receives what `from` holds.
    pub(super) fn propagate_type(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        to: ValueId,
        from: TypeLayer,
    ) {
        for layer in self.hashed_chain(program, ctx, to) {
            self.facts.propagate(layer, from);
        }
    }

    /// Escapes every layer of `v`.
    pub(super) fn escape_type(&mut self, program: &Program, ctx: &GlobalContext, v: ValueId) {
        for layer in self.hashed_chain(program, ctx, v) {
            self.facts.escape(layer);
        }
    }

    /// A function-pointer variable stored to `ptr`. Stores whose value was
    /// traced to its definitions stay confined.
    fn escape_function_pointer(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        ptr: ValueId,
        store: ValueId,
    ) {
        if self.dataflow && self.non_escape_stores.contains(&store) {
            return;
        }
        self.escape_type(program, ctx, ptr);
    }

    /// Casts that reinterpret a struct as untyped memory or an integer cap
    /// the struct. Integer round trips also escape it.
    fn handle_cast(&mut self, program: &Program, ctx: &GlobalContext, cast: ValueId) {
        let Some((_, operand)) = program.as_cast(cast) else {
            return;
        };
        let types = program.types();
        let (from, to) = (program.ty(operand), program.ty(cast));

        let (ty, escapes) = match (types.is_pointer(from), types.is_pointer(to)) {
            (true, true) => {
                let inner_from = innermost_pointee(program, from);
                let inner_to = innermost_pointee(program, to);
                if types.is_struct(inner_from) && is_untyped(program, inner_to) {
                    (inner_from, false)
                } else if types.is_struct(inner_to) && is_untyped(program, inner_from) {
                    (inner_to, false)
                } else {
                    return;
                }
            }
            (true, false) if types.is_integer(to) => (innermost_pointee(program, from), true),
            (false, true) if types.is_integer(from) => (innermost_pointee(program, to), true),
            _ => return,
        };
        if !types.is_struct(ty) {
            return;
        }

        let hash = ctx.types.hash(types, ty);
        self.facts.cap(hash);
        if escapes {
            self.facts.escape(TypeLayer::new(hash, FieldIndex::All));
        }
    }
}
