//! Call graph construction and analysis.
//!
//! [`CallGraphPass`] is the base builder driven by [`run_to_fixpoint`]:
//! its initialization records every direct call, its main phase hands
//! each remaining pointer call to a [`CallResolver`] and merges the
//! answer into the [`GlobalContext`]. [`CallGraph`] is a function-level
//! view of the results with reachability and SCC queries.
//!
//! [`run_to_fixpoint`]: crate::driver::run_to_fixpoint

use indexmap::IndexMap;
use tracing::{debug, info};

use icgraph_core::{FunctionId, ModuleId, Program};

use crate::cha::is_virtual_call;
use crate::driver::IterativePass;
use crate::scc::{scc_stats, tarjan_scc, SccStats};
use crate::strategy::CallResolver;
use crate::{FuncSet, GlobalContext};

/// A function-level call graph.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    /// Every function with at least one edge, in discovery order.
    nodes: FuncSet,
    outgoing: IndexMap<FunctionId, FuncSet>,
    incoming: IndexMap<FunctionId, FuncSet>,
}

impl CallGraph {
    /// Create a new empty call graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from the caller-to-callee relation of `ctx`.
    pub fn from_context(ctx: &GlobalContext) -> Self {
        let mut graph = Self::new();
        for (&caller, callees) in &ctx.call_map {
            for &callee in callees {
                graph.add_call(caller, callee);
            }
        }
        graph
    }

    /// Add a call edge from caller to callee.
    pub fn add_call(&mut self, caller: FunctionId, callee: FunctionId) {
        self.nodes.insert(caller);
        self.nodes.insert(callee);
        self.outgoing.entry(caller).or_default().insert(callee);
        self.incoming.entry(callee).or_default().insert(caller);
    }

    pub fn contains(&self, function: FunctionId) -> bool {
        self.nodes.contains(&function)
    }

    pub fn nodes(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|v| v.len()).sum()
    }

    /// Get all functions called by the given function.
    pub fn callees(&self, caller: FunctionId) -> impl Iterator<Item = FunctionId> + '_ {
        self.outgoing
            .get(&caller)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Get all functions that call the given function.
    pub fn callers(&self, callee: FunctionId) -> impl Iterator<Item = FunctionId> + '_ {
        self.incoming
            .get(&callee)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Check if a function is recursive (calls itself directly or indirectly).
    pub fn is_recursive(&self, function: FunctionId) -> bool {
        let mut visited = FuncSet::new();
        let mut stack = vec![function];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for callee in self.callees(current) {
                if callee == function {
                    return true;
                }
                if !visited.contains(&callee) {
                    stack.push(callee);
                }
            }
        }
        false
    }

    /// Get all functions reachable from the given entry point, entry
    /// included.
    pub fn reachable_from(&self, entry: FunctionId) -> FuncSet {
        let mut reachable = FuncSet::new();
        let mut stack = vec![entry];

        while let Some(current) = stack.pop() {
            if !reachable.insert(current) {
                continue;
            }
            for callee in self.callees(current) {
                if !reachable.contains(&callee) {
                    stack.push(callee);
                }
            }
        }
        reachable
    }

    /// Functions without outgoing edges.
    pub fn leaf_functions(&self) -> Vec<FunctionId> {
        self.nodes()
            .filter(|f| self.outgoing.get(f).map_or(true, |set| set.is_empty()))
            .collect()
    }

    /// Functions without incoming edges.
    pub fn root_functions(&self) -> Vec<FunctionId> {
        self.nodes()
            .filter(|f| self.incoming.get(f).map_or(true, |set| set.is_empty()))
            .collect()
    }

    fn adjacency(&self) -> Vec<Vec<usize>> {
        self.nodes
            .iter()
            .map(|f| {
                self.callees(*f)
                    .filter_map(|callee| self.nodes.get_index_of(&callee))
                    .collect()
            })
            .collect()
    }

    /// Strongly connected components, callees before callers.
    pub fn sccs(&self) -> Vec<Vec<FunctionId>> {
        tarjan_scc(&self.adjacency())
            .into_iter()
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|i| self.nodes.get_index(i).copied())
                    .collect()
            })
            .collect()
    }

    pub fn scc_stats(&self) -> SccStats {
        let adj = self.adjacency();
        let sccs = tarjan_scc(&adj);
        scc_stats(&adj, &sccs)
    }
}

/// The base call-graph builder, parameterized by the resolver stack.
#[derive(Debug)]
pub struct CallGraphPass<R> {
    resolver: R,
    debug: bool,
    initialized_modules: usize,
    finalized_modules: usize,
}

impl<R: CallResolver> CallGraphPass<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            debug: false,
            initialized_modules: 0,
            finalized_modules: 0,
        }
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    pub fn into_resolver(self) -> R {
        self.resolver
    }

    /// Direct calls of one module, with declarations linked to their
    /// definitions.
    fn record_direct_calls(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        module: ModuleId,
    ) {
        let m = program.module(module);
        for &global in &m.globals {
            if program.global(global).has_initializer() {
                ctx.globals.insert(global);
            }
        }
        for &function in &m.functions {
            if program.function(function).is_declaration() {
                continue;
            }
            ctx.stats_mut().num_functions += 1;
            for site in program.call_sites(function) {
                if let Some(callee) = program.base_function(site.callee()) {
                    let target = ctx.resolve_declaration(program, callee);
                    ctx.add_call_edges(site.id, function, [target]);
                }
            }
        }
    }
}

impl<R: CallResolver> IterativePass for CallGraphPass<R> {
    fn name(&self) -> &str {
        self.resolver.name()
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        if self.initialized_modules == 0 {
            ctx.index_global_functions(program);
        }
        if self.initialized_modules < program.modules().len() {
            self.record_direct_calls(program, ctx, module);
            self.initialized_modules += 1;
        }
        self.resolver.initialize(program, ctx, module)
    }

    fn run(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        let mut virtual_calls = 0;
        for &function in &program.module(module).functions {
            for site in program.call_sites(function) {
                if program.base_function(site.callee()).is_some() {
                    continue;
                }
                let is_virtual = is_virtual_call(program, &site);
                let targets = if is_virtual {
                    virtual_calls += 1;
                    ctx.virtual_calls.insert(site.id);
                    self.resolver.resolve_virtual(program, ctx, site.id)
                } else {
                    ctx.indirect_calls.insert(site.id);
                    self.resolver.resolve_indirect(program, ctx, site.id)
                };

                ctx.add_call_edges(site.id, function, targets.iter().copied());
                if !targets.is_empty() {
                    let stats = ctx.stats_mut();
                    stats.num_valid_indirect_calls += 1;
                    stats.num_indirect_call_targets += targets.len();
                }
                if self.debug {
                    debug!(
                        call = %program.value_label(site.id),
                        virtual_call = is_virtual,
                        targets = targets.len(),
                        "call resolved"
                    );
                }
            }
        }
        ctx.stats_mut().num_virtual_calls += virtual_calls;
        // Every strategy answers from facts fixed at initialization, so
        // one visit per module suffices.
        false
    }

    fn finalize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        let changed = self.resolver.finalize(program, ctx, module);
        self.finalized_modules += 1;
        if self.finalized_modules == program.modules().len() {
            let stats = ctx.stats();
            info!(
                strategy = self.resolver.name(),
                functions = stats.num_functions,
                indirect_calls = ctx.indirect_calls.len(),
                virtual_calls = stats.num_virtual_calls,
                resolved = stats.num_valid_indirect_calls,
                targets = stats.num_indirect_call_targets,
                average_targets = stats.average_targets(),
                first_layer_calls = stats.num_first_layer_type_calls,
                second_layer_calls = stats.num_second_layer_type_calls,
                confined_functions = stats.num_confined_funcs,
                simple_calls = stats.num_simple_ind_calls,
                "call graph statistics"
            );
        }
        changed
    }
}
