//! Fixpoint driver for whole-program passes.
//!
//! A pass runs in three phases over the module list:
//!
//! 1. `initialize` is applied to every module, repeating full sweeps
//!    until no module reports a change.
//! 2. `run` is applied the same way until a sweep changes nothing.
//! 3. `finalize` is applied once per module.
//!
//! The driver keeps no state of its own; everything a pass learns lives
//! either in the pass or in the [`GlobalContext`].

use tracing::{debug, info};

use icgraph_core::{ModuleId, Program};

use crate::GlobalContext;

/// A pass driven to a fixpoint over all modules.
pub trait IterativePass {
    /// Name used in progress messages.
    fn name(&self) -> &str;

    /// Gathers facts from one module. Returns true if anything changed.
    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool;

    /// One main-phase visit of a module. Returns true if anything changed.
    fn run(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool;

    /// Post-processing of one module once the main phase is stable.
    fn finalize(
        &mut self,
        _program: &Program,
        _ctx: &mut GlobalContext,
        _module: ModuleId,
    ) -> bool {
        false
    }
}

/// Sweep counts of one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Full initialization sweeps, including the final unchanged one.
    pub init_sweeps: usize,
    /// Main-phase iterations, including the final unchanged one.
    pub iterations: usize,
}

/// Runs `pass` to a fixpoint over every module of `program`.
pub fn run_to_fixpoint<P: IterativePass + ?Sized>(
    pass: &mut P,
    program: &Program,
    ctx: &mut GlobalContext,
) -> PassSummary {
    let modules: Vec<ModuleId> = program.modules().iter().map(|m| m.id).collect();
    let count = modules.len();
    let mut summary = PassSummary::default();

    info!(pass = pass.name(), modules = count, "initializing");
    loop {
        summary.init_sweeps += 1;
        let mut changed = false;
        for &module in &modules {
            changed |= pass.initialize(program, ctx, module);
        }
        if !changed {
            break;
        }
    }

    info!(pass = pass.name(), "processing");
    loop {
        summary.iterations += 1;
        let mut changed = 0usize;
        for (i, &module) in modules.iter().enumerate() {
            if pass.run(program, ctx, module) {
                changed += 1;
            }
            debug!(
                pass = pass.name(),
                iteration = summary.iterations,
                module = %program.module(module).name,
                "[{}/{}] visited",
                i + 1,
                count
            );
        }
        info!(
            pass = pass.name(),
            iteration = summary.iterations,
            changed,
            "iteration finished"
        );
        if changed == 0 {
            break;
        }
    }

    info!(pass = pass.name(), "postprocessing");
    for &module in &modules {
        pass.finalize(program, ctx, module);
    }
    info!(
        pass = pass.name(),
        iterations = summary.iterations,
        "done"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::ProgramBuilder;

    /// Reports a change for the first `init_changes` initialize calls and
    /// the first `run_changes` run calls.
    struct CountingPass {
        init_changes: usize,
        run_changes: usize,
        init_calls: usize,
        run_calls: usize,
        finalize_calls: usize,
    }

    impl CountingPass {
        fn new(init_changes: usize, run_changes: usize) -> Self {
            Self {
                init_changes,
                run_changes,
                init_calls: 0,
                run_calls: 0,
                finalize_calls: 0,
            }
        }
    }

    impl IterativePass for CountingPass {
        fn name(&self) -> &str {
            "Counting"
        }

        fn initialize(&mut self, _: &Program, _: &mut GlobalContext, _: ModuleId) -> bool {
            self.init_calls += 1;
            self.init_calls <= self.init_changes
        }

        fn run(&mut self, _: &Program, _: &mut GlobalContext, _: ModuleId) -> bool {
            self.run_calls += 1;
            self.run_calls <= self.run_changes
        }

        fn finalize(&mut self, _: &Program, _: &mut GlobalContext, _: ModuleId) -> bool {
            self.finalize_calls += 1;
            false
        }
    }

    fn make_program(modules: usize) -> Program {
        let mut pb = ProgramBuilder::new();
        for i in 0..modules {
            pb.add_module(format!("m{i}.c"));
        }
        pb.build()
    }

    #[test]
    fn test_stable_pass_runs_each_phase_once() {
        let program = make_program(3);
        let mut ctx = GlobalContext::new(&program);
        let mut pass = CountingPass::new(0, 0);
        let summary = run_to_fixpoint(&mut pass, &program, &mut ctx);

        assert_eq!(summary, PassSummary { init_sweeps: 1, iterations: 1 });
        assert_eq!(pass.init_calls, 3);
        assert_eq!(pass.run_calls, 3);
        assert_eq!(pass.finalize_calls, 3);
    }

    #[test]
    fn test_changes_trigger_full_sweeps() {
        let program = make_program(2);
        let mut ctx = GlobalContext::new(&program);
        // One change in the first init sweep, changes in the first three
        // run calls (two sweeps).
        let mut pass = CountingPass::new(1, 3);
        let summary = run_to_fixpoint(&mut pass, &program, &mut ctx);

        assert_eq!(summary.init_sweeps, 2);
        assert_eq!(pass.init_calls, 4);
        assert_eq!(summary.iterations, 3);
        assert_eq!(pass.run_calls, 6);
        assert_eq!(pass.finalize_calls, 2);
    }

    #[test]
    fn test_empty_program() {
        let program = make_program(0);
        let mut ctx = GlobalContext::new(&program);
        let mut pass = CountingPass::new(0, 0);
        let summary = run_to_fixpoint(&mut pass, &program, &mut ctx);
        assert_eq!(summary.iterations, 1);
        assert_eq!(pass.finalize_calls, 0);
    }
}
