//! Forward/backward pointer-flow resolution.
//!
//! Two refinements on top of the data-flow-enhanced layer analysis:
//!
//! - *Simple indirect calls*: when the callee value traces back to all of
//!   its definitions, the call resolves to exactly those functions
//!   (filtered by signature) without consulting type layers.
//! - *Confined functions*: an address-taken function whose every use is a
//!   direct call, a known callback-API argument or a private slot that only
//!   reaches simple calls can never be the target of any other indirect
//!   call, so it is removed from layer-based answers.

use indexmap::IndexSet;
use tracing::debug;

use icgraph_core::{ConstExpr, Constant, FunctionId, ModuleId, Opcode, Program, ValueId, ValueKind};

use crate::dataflow::{private_slot_stores, trace_function_pointer, ArgumentFlow};
use crate::layers::MultiLayerAnalysis;
use crate::signature::SignatureMatcher;
use crate::strategy::CallResolver;
use crate::{CallSet, FuncSet, GlobalContext};

/// Library functions taking a callback, with the callback's argument
/// position.
pub const CALLBACK_APIS: &[(&str, usize)] = &[
    ("pthread_create", 2),
    ("thrd_create", 1),
    ("signal", 1),
    ("qsort", 3),
    ("bsearch", 4),
];

/// Callback position of a known callback API.
pub fn callback_position(name: &str) -> Option<usize> {
    CALLBACK_APIS
        .iter()
        .find(|(api, _)| *api == name)
        .map(|&(_, position)| position)
}

/// Pointer-flow decorator over the layer analysis.
#[derive(Debug)]
pub struct PointerFlowAnalysis<R> {
    inner: MultiLayerAnalysis<R>,
    debug: bool,
    confined: FuncSet,
    simple_calls: CallSet,
    initialized_modules: usize,
}

impl<R: CallResolver> PointerFlowAnalysis<R> {
    pub fn new(inner: MultiLayerAnalysis<R>) -> Self {
        Self {
            inner,
            debug: false,
            confined: FuncSet::new(),
            simple_calls: CallSet::new(),
            initialized_modules: 0,
        }
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn inner(&self) -> &MultiLayerAnalysis<R> {
        &self.inner
    }

    /// Address-taken functions reachable only through simple calls.
    pub fn confined_functions(&self) -> &FuncSet {
        &self.confined
    }

    /// Calls resolved by tracing alone.
    pub fn simple_calls(&self) -> &CallSet {
        &self.simple_calls
    }

    fn compute_confined(&mut self, program: &Program, ctx: &GlobalContext) {
        let empty = ArgumentFlow::default();
        let flow = self.inner.argument_flow().unwrap_or(&empty);
        let checker = UseChecker { program, ctx, flow };
        self.confined = ctx
            .address_taken_funcs()
            .iter()
            .copied()
            .filter(|&f| checker.is_confined(f))
            .collect();
    }
}

/// Forward use checks for confinement.
struct UseChecker<'a> {
    program: &'a Program,
    ctx: &'a GlobalContext,
    flow: &'a ArgumentFlow,
}

impl UseChecker<'_> {
    fn is_confined(&self, function: FunctionId) -> bool {
        let program = self.program;
        let mut work = vec![program.function(function).value];
        let mut visited = IndexSet::new();

        while let Some(value) = work.pop() {
            if !visited.insert(value) {
                continue;
            }
            for &user in program.users(value) {
                let accounted = match program.opcode(user) {
                    Some(Opcode::Call(call)) => call.args.iter().enumerate().all(|(i, &arg)| {
                        arg != value
                            || program
                                .base_function(call.callee)
                                .and_then(|api| callback_position(&program.function(api).name))
                                == Some(i)
                    }),
                    Some(Opcode::Store { value: stored, ptr }) => {
                        *stored == value && *ptr != value && self.slot_only_invoked(*ptr)
                    }
                    Some(_) => false,
                    None => match &program.value(user).kind {
                        ValueKind::Global(g) => {
                            let global = program.global(*g);
                            global.initializer == Some(value)
                                && !global.linkage.is_external()
                                && self.slot_only_invoked(user)
                        }
                        ValueKind::Constant(Constant::Expr(ConstExpr::Cast { op, .. }))
                            if op.is_pointer_noop() =>
                        {
                            work.push(user);
                            true
                        }
                        _ => false,
                    },
                };
                if !accounted {
                    return false;
                }
            }
        }
        true
    }

    /// `slot` is private and every load from it is only invoked.
    fn slot_only_invoked(&self, slot: ValueId) -> bool {
        if private_slot_stores(self.program, slot).is_none() {
            return false;
        }
        self.program
            .users(slot)
            .iter()
            .filter(|&&user| matches!(self.program.opcode(user), Some(Opcode::Load { .. })))
            .all(|&load| self.only_invoked(load))
    }

    /// Every use of `start`, through no-op casts and joins, is the callee
    /// of a call whose callee can be traced.
    fn only_invoked(&self, start: ValueId) -> bool {
        let program = self.program;
        let mut work = vec![start];
        let mut visited = IndexSet::new();

        while let Some(v) = work.pop() {
            if !visited.insert(v) {
                continue;
            }
            for &user in program.users(v) {
                match program.opcode(user) {
                    Some(Opcode::Call(call)) if call.callee == v && !call.args.contains(&v) => {
                        if trace_function_pointer(program, self.ctx, self.flow, v).is_none() {
                            return false;
                        }
                    }
                    Some(Opcode::Cast { op, .. }) if op.is_pointer_noop() => work.push(user),
                    Some(Opcode::Phi { .. }) => work.push(user),
                    Some(Opcode::Select { condition, .. }) if *condition != v => work.push(user),
                    _ => return false,
                }
            }
        }
        true
    }
}

impl<R: CallResolver> CallResolver for PointerFlowAnalysis<R> {
    fn name(&self) -> &'static str {
        "PointerFlow"
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        let changed = self.inner.initialize(program, ctx, module);
        if self.initialized_modules >= program.modules().len() {
            return changed;
        }
        self.initialized_modules += 1;
        if self.initialized_modules == program.modules().len() {
            self.compute_confined(program, ctx);
            ctx.stats_mut().num_confined_funcs = self.confined.len();
            debug!(confined = self.confined.len(), "confined functions computed");
        }
        changed
    }

    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        let Some(site) = program.call_site(call) else {
            return FuncSet::new();
        };
        let empty = ArgumentFlow::default();
        let flow = self.inner.argument_flow().unwrap_or(&empty);
        let traced = trace_function_pointer(program, ctx, flow, site.callee())
            .filter(|t| !t.is_empty());

        if let Some(trace) = traced {
            let signature = SignatureMatcher::candidates(program, ctx, call);
            let targets: FuncSet = trace
                .functions
                .iter()
                .copied()
                .filter(|f| signature.contains(f))
                .collect();
            if !targets.is_empty() {
                if self.simple_calls.insert(call) {
                    ctx.stats_mut().num_simple_ind_calls += 1;
                }
                if self.debug {
                    debug!(
                        call = %program.value_label(call),
                        targets = targets.len(),
                        sites = trace.sites.len(),
                        "simple indirect call"
                    );
                }
                return targets;
            }
        }

        let mut targets = self.inner.resolve_indirect(program, ctx, call);
        targets.retain(|f| !self.confined.contains(f));
        targets
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

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::ProgramBuilder;

    fn pointer_flow() -> PointerFlowAnalysis<SignatureMatcher> {
        let layers = MultiLayerAnalysis::new(SignatureMatcher::new(), 10).with_dataflow(true);
        PointerFlowAnalysis::new(layers)
    }

    fn initialize(
        analysis: &mut PointerFlowAnalysis<SignatureMatcher>,
        program: &Program,
    ) -> GlobalContext {
        let mut ctx = GlobalContext::new(program);
        ctx.index_global_functions(program);
        for module in program.modules() {
            analysis.initialize(program, &mut ctx, module.id);
        }
        ctx
    }

    #[test]
    fn test_callback_positions() {
        assert_eq!(callback_position("qsort"), Some(3));
        assert_eq!(callback_position("pthread_create"), Some(2));
        assert_eq!(callback_position("printf"), None);
    }

    #[test]
    fn test_simple_call_and_confined_function() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let i32_ty = pb.types().i32();
        let unary = pb.types().function(i32_ty, vec![i32_ty], false);
        let unary_ptr = pb.types().ptr(unary);
        let slot_ptr = pb.types().ptr(unary_ptr);
        let sink_ty = pb.types().function(void, vec![slot_ptr], false);
        let run_ty = pb.types().function(void, vec![unary_ptr], false);
        let main_ty = pb.types().function(void, vec![], false);

        let f = pb.define_function(m, "f", unary).unwrap();
        let g = pb.define_function(m, "g", unary).unwrap();
        let sink = pb.declare_function(m, "sink", sink_ty).unwrap();
        let run = pb.define_function(m, "run", run_ty).unwrap();
        let main = pb.define_function(m, "main", main_ty).unwrap();
        let (fv, gv, sv) = (pb.function_value(f), pb.function_value(g), pb.function_value(sink));

        let mut body = pb.body(main);
        let x = body.program().const_int(i32_ty, 1);
        let slot = body.alloca(unary_ptr);
        body.store(fv, slot);
        let fp = body.load(slot).unwrap();
        let simple = body.call(fp, &[x]).unwrap();
        let leaked = body.alloca(unary_ptr);
        body.store(gv, leaked);
        body.call(sv, &[leaked]).unwrap();

        let mut body = pb.body(run);
        let cb = body.param(0).unwrap();
        let x = body.program().const_int(i32_ty, 2);
        let opaque = body.call(cb, &[x]).unwrap();
        let program = pb.build();

        let mut analysis = pointer_flow();
        let mut ctx = initialize(&mut analysis, &program);
        assert_eq!(analysis.confined_functions().iter().copied().collect::<Vec<_>>(), vec![f]);
        assert_eq!(ctx.stats().num_confined_funcs, 1);

        let targets = analysis.resolve_indirect(&program, &mut ctx, simple);
        assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![f]);
        assert_eq!(ctx.stats().num_simple_ind_calls, 1);

        let targets = analysis.resolve_indirect(&program, &mut ctx, opaque);
        assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![g]);
    }

    #[test]
    fn test_callback_argument_keeps_function_confined() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let i32_ty = pb.types().i32();
        let handler_ty = pb.types().function(void, vec![i32_ty], false);
        let handler_ptr = pb.types().ptr(handler_ty);
        let signal_ty = pb.types().function(handler_ptr, vec![i32_ty, handler_ptr], false);
        let main_ty = pb.types().function(void, vec![], false);

        let on_int = pb.define_function(m, "on_int", handler_ty).unwrap();
        let signal = pb.declare_function(m, "signal", signal_ty).unwrap();
        let main = pb.define_function(m, "main", main_ty).unwrap();
        let (hv, sv) = (pb.function_value(on_int), pb.function_value(signal));

        let mut body = pb.body(main);
        let sig = body.program().const_int(i32_ty, 2);
        body.call(sv, &[sig, hv]).unwrap();
        let program = pb.build();

        let mut analysis = pointer_flow();
        initialize(&mut analysis, &program);
        assert!(analysis.confined_functions().contains(&on_int));
    }
}
