//! The result store shared by all passes.
//!
//! [`GlobalContext`] owns the call-graph relations (call site to callees,
//! function to call sites that may reach it, function to function) plus
//! the program-wide facts strategies consult: address-taken functions,
//! signature buckets, initialized globals and the mapping from external
//! names to definitions. Passes mutate it through crate-internal methods;
//! everything outside the crate gets read-only views.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use icgraph_core::{FunctionId, GlobalId, Program, ValueId};

use crate::callgraph::CallGraph;
use crate::type_hash::{function_signature, SignatureHash, TypeHasher};

/// A set of functions in discovery order.
pub type FuncSet = IndexSet<FunctionId>;

/// A set of call instructions in discovery order.
pub type CallSet = IndexSet<ValueId>;

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Defined functions seen.
    pub num_functions: usize,
    /// Virtual call sites visited, counted per main-phase iteration.
    pub num_virtual_calls: usize,
    /// Indirect calls answered by the first type layer alone.
    pub num_first_layer_type_calls: usize,
    /// Indirect calls refined past the first type layer.
    pub num_second_layer_type_calls: usize,
    /// Targets of calls answered by the first layer.
    pub num_first_layer_targets: usize,
    /// Targets of calls refined past the first layer.
    pub num_second_layer_targets: usize,
    /// Indirect or virtual calls with at least one target.
    pub num_valid_indirect_calls: usize,
    /// Total targets over those calls.
    pub num_indirect_call_targets: usize,
    /// Address-taken functions whose every use is accounted for.
    pub num_confined_funcs: usize,
    /// Indirect calls whose callee is fully traced to its origins.
    pub num_simple_ind_calls: usize,
}

impl RunStats {
    /// Mean number of targets over calls that resolved.
    pub fn average_targets(&self) -> f64 {
        if self.num_valid_indirect_calls == 0 {
            0.0
        } else {
            self.num_indirect_call_targets as f64 / self.num_valid_indirect_calls as f64
        }
    }
}

/// Analysis results and shared program facts.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    pub(crate) callees: IndexMap<ValueId, FuncSet>,
    pub(crate) callers: IndexMap<FunctionId, CallSet>,
    pub(crate) call_map: IndexMap<FunctionId, FuncSet>,
    pub(crate) called_map: IndexMap<FunctionId, FuncSet>,
    pub(crate) address_taken_funcs: FuncSet,
    pub(crate) sig_funcs: IndexMap<SignatureHash, FuncSet>,
    pub(crate) globals: IndexSet<GlobalId>,
    pub(crate) global_funcs: IndexMap<String, FunctionId>,
    pub(crate) indirect_calls: CallSet,
    pub(crate) virtual_calls: CallSet,
    pub(crate) types: TypeHasher,
    pub(crate) stats: RunStats,
}

impl GlobalContext {
    /// Creates an empty store for `program`.
    pub fn new(program: &Program) -> Self {
        Self {
            types: TypeHasher::from_program(program),
            ..Self::default()
        }
    }

    /// Possible callees of a call instruction.
    pub fn callees(&self, call: ValueId) -> Option<&FuncSet> {
        self.callees.get(&call)
    }

    /// Every call site with its callee set, in discovery order.
    pub fn all_callees(&self) -> impl Iterator<Item = (ValueId, &FuncSet)> {
        self.callees.iter().map(|(&call, set)| (call, set))
    }

    /// Call sites that may invoke `function`.
    pub fn callers(&self, function: FunctionId) -> Option<&CallSet> {
        self.callers.get(&function)
    }

    /// Functions `function` may call.
    pub fn call_map(&self, function: FunctionId) -> Option<&FuncSet> {
        self.call_map.get(&function)
    }

    /// Functions that may call `function`.
    pub fn called_by(&self, function: FunctionId) -> Option<&FuncSet> {
        self.called_map.get(&function)
    }

    pub fn address_taken_funcs(&self) -> &FuncSet {
        &self.address_taken_funcs
    }

    /// Address-taken functions with the given normalised signature.
    pub fn functions_with_signature(&self, sig: SignatureHash) -> Option<&FuncSet> {
        self.sig_funcs.get(&sig)
    }

    /// Globals with an initializer, in module order.
    pub fn initialized_globals(&self) -> &IndexSet<GlobalId> {
        &self.globals
    }

    /// Definition of an externally visible function, by name.
    pub fn global_function(&self, name: &str) -> Option<FunctionId> {
        self.global_funcs.get(name).copied()
    }

    /// Indirect (non-virtual) call sites seen in the main phase.
    pub fn indirect_calls(&self) -> &CallSet {
        &self.indirect_calls
    }

    /// Virtual call sites seen in the main phase.
    pub fn virtual_calls(&self) -> &CallSet {
        &self.virtual_calls
    }

    /// Structural type hasher built from the program's named structs.
    pub fn type_hasher(&self) -> &TypeHasher {
        &self.types
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Function-level call graph over the current results.
    pub fn call_graph(&self) -> CallGraph {
        CallGraph::from_context(self)
    }

    /// Records every externally visible definition by name.
    pub(crate) fn index_global_functions(&mut self, program: &Program) {
        for (id, f) in program.functions() {
            if !f.is_declaration() && f.has_external_linkage() {
                self.global_funcs.entry(f.name.clone()).or_insert(id);
            }
        }
    }

    /// Maps a declaration to the same-signature definition another module
    /// exports under its name, if any.
    pub(crate) fn resolve_declaration(
        &self,
        program: &Program,
        function: FunctionId,
    ) -> FunctionId {
        let f = program.function(function);
        if !f.is_declaration() {
            return function;
        }
        let signature = function_signature(program, function);
        match self.global_funcs.get(&f.name) {
            Some(&def) if function_signature(program, def) == signature => def,
            _ => function,
        }
    }

    /// Replaces declarations in a set by their definitions.
    pub(crate) fn resolve_declarations(&self, program: &Program, set: &FuncSet) -> FuncSet {
        set.iter()
            .map(|&f| self.resolve_declaration(program, f))
            .collect()
    }

    /// Adds `targets` to the callees of `call` and updates the reverse
    /// relations. Returns true if any edge is new.
    pub(crate) fn add_call_edges(
        &mut self,
        call: ValueId,
        caller: FunctionId,
        targets: impl IntoIterator<Item = FunctionId>,
    ) -> bool {
        let mut changed = false;
        let entry = self.callees.entry(call).or_default();
        let mut added = Vec::new();
        for target in targets {
            if entry.insert(target) {
                added.push(target);
            }
        }
        for target in added {
            changed = true;
            self.callers.entry(target).or_default().insert(call);
            self.call_map.entry(caller).or_default().insert(target);
            self.called_map.entry(target).or_default().insert(caller);
        }
        changed
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::{Linkage, ProgramBuilder};

    #[test]
    fn test_add_call_edges_keeps_relations_consistent() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let main = pb.define_function(m, "main", fn_ty).unwrap();
        let f = pb.define_function(m, "f", fn_ty).unwrap();
        let fv = pb.function_value(f);
        let call = pb.body(main).call(fv, &[]).unwrap();
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        assert!(ctx.add_call_edges(call, main, [f]));
        assert!(!ctx.add_call_edges(call, main, [f]));

        assert!(ctx.callees(call).unwrap().contains(&f));
        assert!(ctx.callers(f).unwrap().contains(&call));
        assert!(ctx.call_map(main).unwrap().contains(&f));
        assert!(ctx.called_by(f).unwrap().contains(&main));
    }

    #[test]
    fn test_empty_target_set_still_records_call() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let main = pb.define_function(m, "main", fn_ty).unwrap();
        let f = pb.define_function(m, "f", fn_ty).unwrap();
        let fv = pb.function_value(f);
        let call = pb.body(main).call(fv, &[]).unwrap();
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        assert!(!ctx.add_call_edges(call, main, []));
        assert!(ctx.callees(call).unwrap().is_empty());
        assert!(ctx.call_map(main).is_none());
    }

    #[test]
    fn test_declarations_resolve_to_definitions() {
        let mut pb = ProgramBuilder::new();
        let a = pb.add_module("a.c");
        let b = pb.add_module("b.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let decl = pb.declare_function(a, "helper", fn_ty).unwrap();
        let def = pb.define_function(b, "helper", fn_ty).unwrap();
        pb.body(def).ret(None);
        let local = pb.define_function(b, "local", fn_ty).unwrap();
        pb.set_linkage(local, Linkage::Internal);
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        ctx.index_global_functions(&program);
        assert_eq!(ctx.resolve_declaration(&program, decl), def);
        assert_eq!(ctx.resolve_declaration(&program, def), def);
        assert_eq!(ctx.global_function("helper"), Some(def));
        assert_eq!(ctx.global_function("local"), None);
    }

    #[test]
    fn test_average_targets() {
        let stats = RunStats {
            num_valid_indirect_calls: 4,
            num_indirect_call_targets: 10,
            ..RunStats::default()
        };
        assert!((stats.average_targets() - 2.5).abs() < f64::EPSILON);
        assert_eq!(RunStats::default().average_targets(), 0.0);
    }
}
