//! First-layer type analysis: function-signature matching.
//!
//! An indirect call may reach any address-taken function whose normalised
//! signature equals the call's. Mangled C++ methods (`_ZN...`) are left
//! to the class-hierarchy analysis and never enter the signature buckets.

use tracing::debug;

use icgraph_core::{ModuleId, Program, ValueId};

use crate::strategy::CallResolver;
use crate::type_hash::{call_signature, function_signature};
use crate::{FuncSet, GlobalContext};

/// Returns true for symbols of C++ methods resolved through vtables.
pub fn is_virtual_function(name: &str) -> bool {
    name.starts_with("_ZN")
}

/// Signature-bucket resolver.
#[derive(Debug, Clone, Default)]
pub struct SignatureMatcher {
    initialized_modules: usize,
}

impl SignatureMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates for a call site by signature alone.
    pub fn candidates(program: &Program, ctx: &GlobalContext, call: ValueId) -> FuncSet {
        let Some(site) = program.call_site(call) else {
            return FuncSet::new();
        };
        ctx.functions_with_signature(call_signature(program, &site))
            .cloned()
            .unwrap_or_default()
    }
}

impl CallResolver for SignatureMatcher {
    fn name(&self) -> &'static str {
        "Signature"
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        if self.initialized_modules >= program.modules().len() {
            return false;
        }
        for &id in &program.module(module).functions {
            let f = program.function(id);
            if f.is_intrinsic() || !f.address_taken || is_virtual_function(&f.name) {
                continue;
            }
            ctx.address_taken_funcs.insert(id);
            ctx.sig_funcs
                .entry(function_signature(program, id))
                .or_default()
                .insert(id);
        }

        self.initialized_modules += 1;
        if self.initialized_modules == program.modules().len() {
            // Every module has been seen: replace declarations by the
            // definitions they link to.
            ctx.address_taken_funcs = ctx.resolve_declarations(program, &ctx.address_taken_funcs);
            let buckets: Vec<_> = ctx.sig_funcs.keys().copied().collect();
            for sig in buckets {
                if let Some(set) = ctx.sig_funcs.get(&sig) {
                    let resolved = ctx.resolve_declarations(program, set);
                    ctx.sig_funcs.insert(sig, resolved);
                }
            }
            debug!(
                address_taken = ctx.address_taken_funcs.len(),
                signatures = ctx.sig_funcs.len(),
                "signature buckets ready"
            );
        }
        false
    }

    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        Self::candidates(program, ctx, call)
    }

    fn resolve_virtual(
        &mut self,
        _program: &Program,
        _ctx: &mut GlobalContext,
        _call: ValueId,
    ) -> FuncSet {
        FuncSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::ProgramBuilder;

    #[test]
    fn test_virtual_function_names() {
        assert!(is_virtual_function("_ZN4Base3fooEv"));
        assert!(!is_virtual_function("_Z3fooi"));
        assert!(!is_virtual_function("handler"));
    }

    #[test]
    fn test_buckets_by_signature() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let i32_ty = pb.types().i32();
        let void = pb.types().void();
        let unary = pb.types().function(i32_ty, vec![i32_ty], false);
        let nullary = pb.types().function(void, vec![], false);
        let unary_ptr = pb.types().ptr(unary);
        let nullary_ptr = pb.types().ptr(nullary);

        let a = pb.define_function(m, "a", unary).unwrap();
        let b = pb.define_function(m, "b", unary).unwrap();
        let c = pb.define_function(m, "c", nullary).unwrap();
        let d = pb.define_function(m, "d", unary).unwrap();
        let method = pb.define_function(m, "_ZN1S1fEi", unary).unwrap();
        let main = pb.define_function(m, "main", nullary).unwrap();

        let (av, bv, cv, dv, mv) = (
            pb.function_value(a),
            pb.function_value(b),
            pb.function_value(c),
            pb.function_value(d),
            pb.function_value(method),
        );
        let mut body = pb.body(main);
        let slot = body.alloca(unary_ptr);
        body.store(av, slot);
        body.store(bv, slot);
        body.store(mv, slot);
        let other = body.alloca(nullary_ptr);
        body.store(cv, other);
        let arg = body.program().const_int(i32_ty, 1);
        body.call(dv, &[arg]).unwrap();
        let fp = body.load(slot).unwrap();
        let icall = body.call(fp, &[arg]).unwrap();
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        let mut matcher = SignatureMatcher::new();
        matcher.initialize(&program, &mut ctx, m);

        let targets = matcher.resolve_indirect(&program, &mut ctx, icall);
        // d is only called directly, the method is left to CHA.
        assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![a, b]);
        assert!(ctx.address_taken_funcs().contains(&c));
        assert!(!ctx.address_taken_funcs().contains(&d));
    }

    #[test]
    fn test_declarations_remapped_after_last_module() {
        let mut pb = ProgramBuilder::new();
        let a = pb.add_module("a.c");
        let b = pb.add_module("b.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let fn_ptr = pb.types().ptr(fn_ty);

        let decl = pb.declare_function(a, "cb", fn_ty).unwrap();
        let user = pb.define_function(a, "user", fn_ty).unwrap();
        let def = pb.define_function(b, "cb", fn_ty).unwrap();
        pb.body(def).ret(None);
        let dv = pb.function_value(decl);
        let mut body = pb.body(user);
        let slot = body.alloca(fn_ptr);
        body.store(dv, slot);
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        ctx.index_global_functions(&program);
        let mut matcher = SignatureMatcher::new();
        matcher.initialize(&program, &mut ctx, a);
        assert!(ctx.address_taken_funcs().contains(&decl));
        matcher.initialize(&program, &mut ctx, b);
        assert!(ctx.address_taken_funcs().contains(&def));
        assert!(!ctx.address_taken_funcs().contains(&decl));
    }
}
