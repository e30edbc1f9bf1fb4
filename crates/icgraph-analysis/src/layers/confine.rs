//! Confinement: recording which functions each type layer may hold.

use std::collections::VecDeque;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use icgraph_core::{
    CastOp, Constant, FunctionId, GlobalId, Opcode, Program, Type, ValueId, ValueKind,
};

use super::MultiLayerAnalysis;
use crate::dataflow::trace_function_pointer;
use crate::strategy::CallResolver;
use crate::type_hash::FieldIndex;
use crate::GlobalContext;

/// Linker bookkeeping arrays, never real containers.
const LINKER_USED: [&str; 2] = ["llvm.compiler.used", "llvm.used"];

impl<R: CallResolver> MultiLayerAnalysis<R> {
    /// Remembers `i8*` call results that are cast to exactly one struct
    /// pointer type.
    pub(super) fn collect_aliases(&mut self, program: &Program, function: FunctionId) {
        let types = program.types();
        let mut found: IndexMap<ValueId, Option<ValueId>> = IndexMap::new();

        for inst in program.function(function).instructions() {
            let Some(Opcode::Cast { operand, .. }) = program.opcode(inst) else {
                continue;
            };
            if !program.opcode(*operand).is_some_and(|op| matches!(op, Opcode::Call(_))) {
                continue;
            }
            let raw = types.pointee(program.ty(*operand));
            if !raw.is_some_and(|p| matches!(types.get(p), Type::Integer { bits: 8 })) {
                continue;
            }
            if !types
                .pointee(program.ty(inst))
                .is_some_and(|p| types.is_composite(p))
            {
                continue;
            }
            found
                .entry(*operand)
                .and_modify(|cast| *cast = None)
                .or_insert(Some(inst));
        }

        for (raw, cast) in found {
            if let Some(cast) = cast {
                self.aliases.insert(raw, cast);
            }
        }
    }

    /// Confines every function address found in a global's aggregate
    /// initializer to each enclosing `(aggregate type, operand index)`.
    pub(super) fn confine_initializer(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        global: GlobalId,
    ) {
        let g = program.global(global);
        if LINKER_USED.contains(&g.name.as_str()) {
            return;
        }
        let Some(init) = g.initializer else {
            return;
        };
        if !matches!(program.value(init).as_constant(), Some(Constant::Aggregate(_))) {
            return;
        }

        let types = program.types();
        let mut containers: IndexMap<ValueId, (ValueId, usize)> = IndexMap::new();
        let mut queue = VecDeque::from([init]);
        let mut visited = FxHashSet::default();

        while let Some(user) = queue.pop_front() {
            if !visited.insert(user) {
                continue;
            }
            let Some(Constant::Aggregate(elements)) = program.value(user).as_constant() else {
                continue;
            };
            for (index, &element) in elements.iter().enumerate() {
                containers.insert(element, (user, index));
                let ty = program.ty(element);

                let found = match &program.value(element).kind {
                    ValueKind::Function(f) => Some(*f),
                    _ if types.is_composite(ty) => {
                        queue.push_back(element);
                        None
                    }
                    _ => match program.as_cast(element) {
                        Some((CastOp::BitCast | CastOp::PtrToInt, operand)) => {
                            match &program.value(operand).kind {
                                ValueKind::Function(f) => Some(*f),
                                ValueKind::Global(inner) => {
                                    if types.is_struct(program.global(*inner).value_type) {
                                        self.facts.cap(ctx.types.hash(types, program.ty(user)));
                                    }
                                    None
                                }
                                _ => {
                                    queue.push_back(operand);
                                    None
                                }
                            }
                        }
                        _ => {
                            if let (Some(pointee), Some(_)) =
                                (types.pointee(ty), program.value(element).as_global())
                            {
                                // A pointer to another global object: its
                                // contents are confined on their own.
                                if types.is_struct(pointee) {
                                    self.facts.cap(ctx.types.hash(types, pointee));
                                }
                            } else if types.is_pointer(ty) {
                                queue.push_back(element);
                            }
                            None
                        }
                    },
                };

                let Some(f) = found.filter(|&f| !program.function(f).is_intrinsic()) else {
                    continue;
                };
                self.facts.mark_stored(f);
                let mut current = element;
                let mut seen = FxHashSet::default();
                while let Some(&(container, slot)) = containers.get(&current) {
                    let layer = ctx
                        .types
                        .layer(types, program.ty(container), FieldIndex::At(slot as u64));
                    self.facts.confine(layer, f);
                    seen.insert(current);
                    if seen.contains(&container) {
                        break;
                    }
                    current = container;
                }
            }
        }
    }

    /// Confines functions stored to memory or passed to calls in one
    /// function body.
    pub(super) fn confine_in_function(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        function: FunctionId,
    ) {
        for inst in program.function(function).instructions() {
            match program.opcode(inst) {
                Some(Opcode::Store { value, ptr }) => {
                    self.confine_store(program, ctx, inst, *value, *ptr)
                }
                Some(Opcode::Call(_)) => self.confine_call_args(program, ctx, inst),
                _ => {}
            }
        }
    }

    fn confine_store(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        store: ValueId,
        value: ValueId,
        ptr: ValueId,
    ) {
        if let Some(f) = program.base_function(value) {
            if !program.function(f).is_intrinsic() {
                self.confine_target(program, ctx, ptr, f);
            }
            return;
        }
        if !self.dataflow {
            return;
        }
        let stripped = program.strip_pointer_casts(value);
        if program.types().function_pointee(program.ty(stripped)).is_none() {
            return;
        }
        let traced = self
            .flow
            .as_ref()
            .and_then(|flow| trace_function_pointer(program, ctx, flow, value));
        if let Some(trace) = traced.filter(|t| !t.is_empty()) {
            for f in trace.functions {
                self.confine_target(program, ctx, ptr, f);
            }
            self.non_escape_stores.insert(store);
        }
    }

    /// Function constants passed as call arguments.
    ///
    /// For an indirect call the argument itself is confined. For a direct
    /// call, whatever the callee does with the matching parameter (store
    /// it, or cast it) is confined.
    fn confine_call_args(&mut self, program: &Program, ctx: &GlobalContext, call: ValueId) {
        let Some(site) = program.call_site(call) else {
            return;
        };
        let callee = program
            .base_function(site.callee())
            .map(|f| ctx.resolve_declaration(program, f));

        for (index, &arg) in site.args().iter().enumerate() {
            let Some(f) = program.value(arg).as_function() else {
                continue;
            };
            if program.function(f).is_intrinsic() {
                continue;
            }
            let Some(callee) = callee else {
                self.confine_target(program, ctx, arg, f);
                continue;
            };
            let callee = program.function(callee);
            if callee.is_declaration() {
                continue;
            }
            let Some(&param) = callee.params.get(index) else {
                continue;
            };
            for &user in program.users(param) {
                match program.opcode(user) {
                    Some(Opcode::Store { value, ptr }) if *value == param => {
                        self.confine_target(program, ctx, *ptr, f);
                    }
                    _ => {
                        if let Some((CastOp::BitCast, _)) = program.as_cast(user) {
                            self.confine_target(program, ctx, user, f);
                        }
                    }
                }
            }
        }
    }

    /// Records that `function` is held by the location `target`.
    pub(super) fn confine_target(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        target: ValueId,
        function: FunctionId,
    ) {
        if program.function(function).is_intrinsic() {
            return;
        }
        self.facts.mark_stored(function);
        for layer in self.hashed_chain(program, ctx, target) {
            self.facts.confine(layer, function);
        }
    }
}
