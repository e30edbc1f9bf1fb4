//! Class-hierarchy analysis for virtual calls.
//!
//! The hierarchy is recovered from two independent sources, unioned:
//! vtable initializers ([`vtable`]) and base-constructor calls or vtable
//! stores inside constructors and destructors ([`structors`]). A virtual
//! call is then resolved from the static class of its `this` argument:
//! the slot it loads is looked up in the vtables of that class and of
//! every class derived from it.

mod hierarchy;
mod structors;
mod vtable;

use tracing::debug;

use icgraph_core::{CallSite, FunctionId, GepIndex, ModuleId, Opcode, Program, ValueId};
use icgraph_demangle::{MethodName, PURE_VIRTUAL};

pub use hierarchy::{ClassAttrs, ClassHierarchy};
pub use structors::{same_this_ptr, scan_structors};
pub use vtable::{scan_vtables, thunk_target};

use crate::strategy::CallResolver;
use crate::type_hash::{call_signature, function_signature, valid_struct_name};
use crate::{FuncSet, GlobalContext};

/// Struct-name prefixes C++ front ends give classes.
const CLASS_PREFIXES: &[&str] = &["class.", "struct."];

/// The `getelementptr` selecting a slot of a virtual call.
///
/// Matches `call (load (gep (load %vtable), k))(this, ...)`: the callee is
/// loaded from a single-index offset into a value loaded under a name
/// containing `vtable`, and the first argument is a pointer.
fn vtable_gep(program: &Program, site: &CallSite<'_>) -> Option<ValueId> {
    if program.base_function(site.callee()).is_some() {
        return None;
    }
    let this = site.arg(0)?;
    if !program.types().is_pointer(program.ty(this)) {
        return None;
    }
    let Some(Opcode::Load { ptr }) = program.opcode(site.callee()) else {
        return None;
    };
    let Some(Opcode::GetElementPtr { base, indices, .. }) = program.opcode(*ptr) else {
        return None;
    };
    if indices.len() != 1 {
        return None;
    }
    let loaded = matches!(program.opcode(*base), Some(Opcode::Load { .. }));
    (loaded && program.value(*base).name_contains("vtable")).then_some(*ptr)
}

/// Returns true if the call dispatches through a vtable.
pub fn is_virtual_call(program: &Program, site: &CallSite<'_>) -> bool {
    vtable_gep(program, site).is_some()
}

/// Vtable slot a virtual call loads, when the index is constant.
pub fn vtable_slot(program: &Program, site: &CallSite<'_>) -> Option<usize> {
    let gep = program.as_gep(vtable_gep(program, site)?)?;
    match gep.indices.first()? {
        GepIndex::Const(k) => usize::try_from(*k).ok(),
        GepIndex::Dynamic(_) => None,
    }
}

/// The `this` argument: the first one, or the second after a struct-return
/// slot.
pub fn this_argument(site: &CallSite<'_>) -> Option<ValueId> {
    site.arg(usize::from(site.has_sret()))
}

/// Class named by a `%class.ns::Base.12*` pointer type.
pub fn static_class(program: &Program, this: ValueId) -> Option<String> {
    let types = program.types();
    [this, program.strip_pointer_casts(this)]
        .into_iter()
        .filter_map(|v| types.pointee(program.ty(v)))
        .filter_map(|ty| types.struct_name(ty))
        .find_map(|name| {
            CLASS_PREFIXES
                .iter()
                .find_map(|prefix| name.strip_prefix(prefix))
                .map(|class| valid_struct_name(class).to_string())
        })
}

fn same_method(expected: &MethodName, candidate: &str) -> bool {
    let Some(candidate) = MethodName::parse(candidate) else {
        return true;
    };
    if expected.method.starts_with('~') {
        return candidate.method.starts_with('~');
    }
    candidate.method == expected.method
}

/// Class-hierarchy decorator: answers virtual calls itself and forwards
/// everything else.
#[derive(Debug)]
pub struct ClassHierarchyAnalysis<R> {
    inner: R,
    debug: bool,
    hierarchy: ClassHierarchy,
    initialized_modules: usize,
}

impl<R: CallResolver> ClassHierarchyAnalysis<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            debug: false,
            hierarchy: ClassHierarchy::new(),
            initialized_modules: 0,
        }
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// Method name the static class has in `slot`, if a real method fills
    /// it.
    fn expected_method(&self, program: &Program, class: &str, slot: usize) -> Option<MethodName> {
        self.hierarchy
            .slots(class)
            .iter()
            .filter_map(|table| table.get(slot))
            .map(|&f| program.function(f).name.as_str())
            .filter(|name| *name != PURE_VIRTUAL)
            .find_map(MethodName::parse)
    }

    /// Candidates of a virtual call before declarations are resolved.
    fn virtual_targets(&self, program: &Program, site: &CallSite<'_>) -> Vec<FunctionId> {
        let Some(this) = this_argument(site) else {
            return Vec::new();
        };
        let slot = vtable_slot(program, site);
        let known = static_class(program, this).filter(|c| self.hierarchy.contains(c));
        let classes: Vec<String> = match &known {
            Some(class) => self.hierarchy.descendants(class).into_iter().collect(),
            None => self.hierarchy.classes().map(str::to_string).collect(),
        };
        let expected = known
            .as_deref()
            .zip(slot)
            .and_then(|(class, k)| self.expected_method(program, class, k));
        let signature = call_signature(program, site);

        let mut targets = Vec::new();
        for class in &classes {
            for table in self.hierarchy.slots(class) {
                let entries: &[FunctionId] = match slot {
                    Some(k) => table.get(k).map(std::slice::from_ref).unwrap_or_default(),
                    None => table,
                };
                for &f in entries {
                    let name = &program.function(f).name;
                    if name == PURE_VIRTUAL || function_signature(program, f) != signature {
                        continue;
                    }
                    if expected.as_ref().is_some_and(|m| !same_method(m, name)) {
                        continue;
                    }
                    targets.push(f);
                }
            }
        }
        targets
    }
}

impl<R: CallResolver> CallResolver for ClassHierarchyAnalysis<R> {
    fn name(&self) -> &'static str {
        "ClassHierarchy"
    }

    fn initialize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        let changed = self.inner.initialize(program, ctx, module);
        if self.initialized_modules >= program.modules().len() {
            return changed;
        }
        let tables = scan_vtables(program, module, &mut self.hierarchy);
        let edges = scan_structors(program, module, &mut self.hierarchy);
        if self.debug {
            debug!(
                module = %program.module(module).name,
                vtables = tables,
                structor_edges = edges,
                "class hierarchy scanned"
            );
        }

        self.initialized_modules += 1;
        if self.initialized_modules == program.modules().len() {
            debug!(classes = self.hierarchy.len(), "class hierarchy ready");
        }
        changed
    }

    fn resolve_indirect(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        self.inner.resolve_indirect(program, ctx, call)
    }

    fn resolve_virtual(
        &mut self,
        program: &Program,
        ctx: &mut GlobalContext,
        call: ValueId,
    ) -> FuncSet {
        let Some(site) = program.call_site(call) else {
            return FuncSet::new();
        };
        let targets: FuncSet = self
            .virtual_targets(program, &site)
            .into_iter()
            .map(|f| ctx.resolve_declaration(program, f))
            .collect();
        if self.debug {
            debug!(
                call = %program.value_label(call),
                slot = ?vtable_slot(program, &site),
                targets = targets.len(),
                "virtual call resolved"
            );
        }
        targets
    }

    fn finalize(&mut self, program: &Program, ctx: &mut GlobalContext, module: ModuleId) -> bool {
        self.inner.finalize(program, ctx, module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureMatcher;
    use icgraph_core::{CastOp, ProgramBuilder, TypeId};

    struct Classes {
        program: Program,
        call: ValueId,
        untyped_call: ValueId,
        base_f: FunctionId,
        base_g: FunctionId,
        derived_f: FunctionId,
        other_f: FunctionId,
    }

    /// `Base { f, g }`, `Derived : Base` overriding `f`, an unrelated
    /// `Other { f }`, then `this->vtable[0](this)` once on a `Base*` and
    /// once on an `i8*`.
    fn classes() -> Classes {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.cpp");
        let void = pb.types().void();
        let raw = pb.types().void_ptr();
        let i8_ty = pb.types().i8();
        let vptr = pb.types().ptr(raw);
        let base = pb.add_struct(m, "class.Base", vec![vptr]).unwrap();
        let derived = pb.add_struct(m, "class.Derived", vec![base]).unwrap();
        let other = pb.add_struct(m, "class.Other", vec![vptr]).unwrap();
        let ptr = |pb: &mut ProgramBuilder, ty: TypeId| pb.types().ptr(ty);
        let (base_ptr, derived_ptr, other_ptr) =
            (ptr(&mut pb, base), ptr(&mut pb, derived), ptr(&mut pb, other));
        let method =
            |pb: &mut ProgramBuilder, this: TypeId| pb.types().function(void, vec![this], false);
        let (base_m, derived_m, other_m) = (
            method(&mut pb, base_ptr),
            method(&mut pb, derived_ptr),
            method(&mut pb, other_ptr),
        );

        let base_f = pb.define_function(m, "_ZN4Base1fEv", base_m).unwrap();
        let base_g = pb.define_function(m, "_ZN4Base1gEv", base_m).unwrap();
        let derived_f = pb.define_function(m, "_ZN7Derived1fEv", derived_m).unwrap();
        let other_f = pb.define_function(m, "_ZN5Other1fEv", other_m).unwrap();
        let base_ctor = pb.define_function(m, "_ZN4BaseC2Ev", base_m).unwrap();
        let derived_ctor = pb.define_function(m, "_ZN7DerivedC2Ev", derived_m).unwrap();

        let vtable = |pb: &mut ProgramBuilder, name: &str, ti: &str, methods: &[FunctionId]| {
            let ti = pb.add_global(m, ti, i8_ty, None);
            let ti_v = pb.global_value(ti);
            let mut entries = vec![pb.const_null(raw), pb.const_cast(CastOp::BitCast, ti_v, raw)];
            for &f in methods {
                let fv = pb.function_value(f);
                entries.push(pb.const_cast(CastOp::BitCast, fv, raw));
            }
            let array_ty = pb.types().array(raw, entries.len() as u64);
            let array = pb.const_aggregate(array_ty, entries);
            let outer = pb.types().anon_struct(vec![array_ty]);
            let init = pb.const_aggregate(outer, vec![array]);
            pb.add_global(m, name, outer, Some(init));
        };
        vtable(&mut pb, "_ZTV4Base", "_ZTI4Base", &[base_f, base_g]);
        vtable(&mut pb, "_ZTV7Derived", "_ZTI7Derived", &[derived_f, base_g]);
        vtable(&mut pb, "_ZTV5Other", "_ZTI5Other", &[other_f]);

        let base_ctor_v = pb.function_value(base_ctor);
        let mut body = pb.body(derived_ctor);
        let this = body.param(0).unwrap();
        let as_base = body.bitcast(this, base_ptr);
        body.call(base_ctor_v, &[as_base]).unwrap();

        let caller_ty = pb.types().function(void, vec![base_ptr], false);
        let caller = pb.define_function(m, "_Z4callP4Base", caller_ty).unwrap();
        let base_m_ptr = pb.types().ptr(base_m);
        let table_ptr = pb.types().ptr(base_m_ptr);
        let object_ptr = pb.types().ptr(table_ptr);
        let mut body = pb.body(caller);
        let obj = body.param(0).unwrap();
        let vptr_slot = body.bitcast(obj, object_ptr);
        let table = body.load_named(vptr_slot, "vtable").unwrap();
        let entry = body.gep(table, &[GepIndex::Const(0)]).unwrap();
        let fp = body.load(entry).unwrap();
        let call = body.call(fp, &[obj]).unwrap();

        let untyped_ty = pb.types().function(void, vec![raw], false);
        let untyped = pb.define_function(m, "_Z7untypedPv", untyped_ty).unwrap();
        let mut body = pb.body(untyped);
        let obj = body.param(0).unwrap();
        let vptr_slot = body.bitcast(obj, object_ptr);
        let table = body.load_named(vptr_slot, "vtable").unwrap();
        let entry = body.gep(table, &[GepIndex::Const(0)]).unwrap();
        let fp = body.load(entry).unwrap();
        let untyped_call = body.call(fp, &[obj]).unwrap();

        Classes {
            program: pb.build(),
            call,
            untyped_call,
            base_f,
            base_g,
            derived_f,
            other_f,
        }
    }

    fn initialized(program: &Program) -> (ClassHierarchyAnalysis<SignatureMatcher>, GlobalContext) {
        let mut ctx = GlobalContext::new(program);
        ctx.index_global_functions(program);
        let mut cha = ClassHierarchyAnalysis::new(SignatureMatcher::new());
        for module in program.modules() {
            cha.initialize(program, &mut ctx, module.id);
        }
        (cha, ctx)
    }

    #[test]
    fn test_virtual_call_pattern() {
        let fx = classes();
        let site = fx.program.call_site(fx.call).unwrap();
        assert!(is_virtual_call(&fx.program, &site));
        assert_eq!(vtable_slot(&fx.program, &site), Some(0));
        let this = this_argument(&site).unwrap();
        assert_eq!(static_class(&fx.program, this).as_deref(), Some("Base"));
    }

    #[test]
    fn test_direct_call_is_not_virtual() {
        let fx = classes();
        let main = fx.program.function_by_name("_ZN7DerivedC2Ev").unwrap();
        for site in fx.program.call_sites(main) {
            assert!(!is_virtual_call(&fx.program, &site));
        }
    }

    #[test]
    fn test_hierarchy_from_both_sources() {
        let fx = classes();
        let (cha, _) = initialized(&fx.program);
        let h = cha.hierarchy();
        // Derived's vtable inherits Base::g, and its constructor calls Base's.
        assert_eq!(h.bases("Derived").collect::<Vec<_>>(), vec!["Base"]);
        assert_eq!(h.slots("Other").len(), 1);
        assert!(h.descendants("Base").contains("Derived"));
        assert!(!h.descendants("Base").contains("Other"));
    }

    #[test]
    fn test_resolves_slot_in_static_class_and_descendants() {
        let fx = classes();
        let (mut cha, mut ctx) = initialized(&fx.program);
        let targets = cha.resolve_virtual(&fx.program, &mut ctx, fx.call);
        assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![fx.base_f, fx.derived_f]);
    }

    #[test]
    fn test_unknown_static_class_scans_every_class() {
        let fx = classes();
        let (mut cha, mut ctx) = initialized(&fx.program);
        let site = fx.program.call_site(fx.untyped_call).unwrap();
        assert!(is_virtual_call(&fx.program, &site));
        assert_eq!(static_class(&fx.program, this_argument(&site).unwrap()), None);

        let targets = cha.resolve_virtual(&fx.program, &mut ctx, fx.untyped_call);
        assert_eq!(
            targets.into_iter().collect::<Vec<_>>(),
            vec![fx.base_f, fx.derived_f, fx.other_f]
        );
    }

    #[test]
    fn test_expected_method_from_static_class() {
        let fx = classes();
        let (cha, _) = initialized(&fx.program);
        assert!(cha.expected_method(&fx.program, "Base", 7).is_none());
        assert_eq!(
            cha.expected_method(&fx.program, "Base", 1).map(|m| m.method),
            Some("g".to_string())
        );
        assert!(cha.hierarchy().slots("Derived")[0].contains(&fx.base_g));
    }

    #[test]
    fn test_method_name_filter() {
        let expected = MethodName::from_demangled("Base::~Base()");
        assert!(same_method(&expected, "_ZN7DerivedD0Ev"));
        assert!(!same_method(&expected, "_ZN7Derived1fEv"));
        let f = MethodName::from_demangled("Base::f()");
        assert!(same_method(&f, "_ZN7Derived1fEv"));
        assert!(!same_method(&f, "_ZN7Derived1gEv"));
        assert!(same_method(&f, "plain_c_function"));
    }
}
