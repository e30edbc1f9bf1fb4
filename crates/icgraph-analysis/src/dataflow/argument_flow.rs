//! Functions flowing into function-pointer parameters.
//!
//! The direct call graph is split into strongly connected components and
//! visited callers first, so by the time a component is processed every
//! outside caller has contributed. Inside a component a worklist re-visits
//! members until their parameter sets stop growing, which is how mutual
//! recursion converges.

use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::debug;

use icgraph_core::{FunctionId, Program};

use super::trace::trace_function_pointer;
use crate::scc::tarjan_scc;
use crate::{FuncSet, GlobalContext};

/// What is known about one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamFlow {
    /// Exactly these functions are passed in.
    Known(FuncSet),
    /// Callers outside the program, or arguments that cannot be traced.
    Unknown,
}

impl ParamFlow {
    /// Merges `incoming`; returns true if the flow changed.
    fn merge(&mut self, incoming: Option<&FuncSet>) -> bool {
        match (self, incoming) {
            (ParamFlow::Unknown, _) => false,
            (this, None) => {
                *this = ParamFlow::Unknown;
                true
            }
            (ParamFlow::Known(set), Some(incoming)) => {
                let before = set.len();
                set.extend(incoming.iter().copied());
                set.len() != before
            }
        }
    }
}

/// Per-parameter function flow over the whole program.
#[derive(Debug, Clone, Default)]
pub struct ArgumentFlow {
    params: IndexMap<(FunctionId, usize), ParamFlow>,
}

impl ArgumentFlow {
    /// Computes the flow for every function-pointer parameter.
    pub fn compute(program: &Program, ctx: &GlobalContext) -> Self {
        let defined: Vec<FunctionId> = program
            .functions()
            .filter(|(_, f)| !f.is_declaration())
            .map(|(id, _)| id)
            .collect();
        let index: IndexMap<FunctionId, usize> =
            defined.iter().enumerate().map(|(i, &f)| (f, i)).collect();

        let mut adj = vec![Vec::new(); defined.len()];
        let mut has_callers = vec![false; defined.len()];
        for (i, &f) in defined.iter().enumerate() {
            for site in program.call_sites(f) {
                let Some(callee) = program.base_function(site.callee()) else {
                    continue;
                };
                if let Some(&j) = index.get(&ctx.resolve_declaration(program, callee)) {
                    adj[i].push(j);
                    has_callers[j] = true;
                }
            }
        }

        let mut flow = Self::default();
        for (i, &f) in defined.iter().enumerate() {
            let function = program.function(f);
            let open =
                function.address_taken || (function.has_external_linkage() && !has_callers[i]);
            for (p, &param) in function.params.iter().enumerate() {
                if program.types().function_pointee(program.ty(param)).is_none() {
                    continue;
                }
                let state = if open {
                    ParamFlow::Unknown
                } else {
                    ParamFlow::Known(FuncSet::new())
                };
                flow.params.insert((f, p), state);
            }
        }

        let sccs = tarjan_scc(&adj);
        for scc in sccs.iter().rev() {
            let members: Vec<FunctionId> = scc.iter().map(|&i| defined[i]).collect();
            let mut queue: VecDeque<FunctionId> = members.iter().copied().collect();
            let mut visits = 0usize;

            while let Some(f) = queue.pop_front() {
                visits += 1;
                for callee in flow.visit_caller(program, ctx, f) {
                    if members.contains(&callee) && !queue.contains(&callee) {
                        queue.push_back(callee);
                    }
                }
            }
            if members.len() > 1 {
                debug!(functions = members.len(), visits, "recursive component converged");
            }
        }
        flow
    }

    /// Pushes the arguments of every direct call in `caller` into the
    /// callee's parameters. Returns the callees whose flow changed.
    fn visit_caller(
        &mut self,
        program: &Program,
        ctx: &GlobalContext,
        caller: FunctionId,
    ) -> Vec<FunctionId> {
        let mut changed = Vec::new();
        for site in program.call_sites(caller) {
            let Some(callee) = program.base_function(site.callee()) else {
                continue;
            };
            let callee = ctx.resolve_declaration(program, callee);
            for (p, &arg) in site.args().iter().enumerate() {
                if !self.params.contains_key(&(callee, p)) {
                    continue;
                }
                let traced = trace_function_pointer(program, ctx, self, arg).map(|t| t.functions);
                if let Some(state) = self.params.get_mut(&(callee, p)) {
                    if state.merge(traced.as_ref()) && !changed.contains(&callee) {
                        changed.push(callee);
                    }
                }
            }
        }
        changed
    }

    pub fn param(&self, function: FunctionId, index: usize) -> Option<&ParamFlow> {
        self.params.get(&(function, index))
    }

    /// Functions passed to a parameter, if they are all known.
    pub fn known(&self, function: FunctionId, index: usize) -> Option<&FuncSet> {
        match self.params.get(&(function, index))? {
            ParamFlow::Known(set) => Some(set),
            ParamFlow::Unknown => None,
        }
    }

    pub fn tracked_params(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::{Linkage, ProgramBuilder};

    #[test]
    fn test_flow_through_mutual_recursion() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let cb = pb.types().function(void, vec![], false);
        let cb_ptr = pb.types().ptr(cb);
        let walker_ty = pb.types().function(void, vec![cb_ptr], false);

        let h = pb.define_function(m, "h", cb).unwrap();
        let a = pb.define_function(m, "a", walker_ty).unwrap();
        let b = pb.define_function(m, "b", walker_ty).unwrap();
        let main = pb.define_function(m, "main", cb).unwrap();
        for f in [a, b] {
            pb.set_linkage(f, Linkage::Internal);
        }
        let (hv, av, bv) = (pb.function_value(h), pb.function_value(a), pb.function_value(b));

        let mut body = pb.body(a);
        let fp = body.param(0).unwrap();
        body.call(bv, &[fp]).unwrap();
        body.call(av, &[fp]).unwrap();
        let mut body = pb.body(b);
        let fp = body.param(0).unwrap();
        body.call(av, &[fp]).unwrap();
        pb.body(main).call(av, &[hv]).unwrap();
        let program = pb.build();

        let ctx = GlobalContext::new(&program);
        let flow = ArgumentFlow::compute(&program, &ctx);
        assert_eq!(flow.known(a, 0).map(|s| s.len()), Some(1));
        assert!(flow.known(b, 0).unwrap().contains(&h));
        assert_eq!(flow.tracked_params(), 2);
    }

    #[test]
    fn test_address_taken_function_is_unknown() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let cb = pb.types().function(void, vec![], false);
        let cb_ptr = pb.types().ptr(cb);
        let walker_ty = pb.types().function(void, vec![cb_ptr], false);
        let walker_ptr = pb.types().ptr(walker_ty);

        let walker = pb.define_function(m, "walker", walker_ty).unwrap();
        pb.set_linkage(walker, Linkage::Internal);
        let main = pb.define_function(m, "main", cb).unwrap();
        let wv = pb.function_value(walker);
        let mut body = pb.body(main);
        let slot = body.alloca(walker_ptr);
        body.store(wv, slot);
        let program = pb.build();

        let ctx = GlobalContext::new(&program);
        let flow = ArgumentFlow::compute(&program, &ctx);
        assert_eq!(flow.param(walker, 0), Some(&ParamFlow::Unknown));
    }
}
