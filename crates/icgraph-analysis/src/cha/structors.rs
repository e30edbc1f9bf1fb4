//! Inheritance evidence from constructor and destructor bodies.
//!
//! A constructor of `Derived` calls the constructor of each direct base on
//! its own `this` pointer and stores vtable addresses into the object.
//! Either pattern is recorded as an inheritance edge, independently of how
//! the vtables themselves are laid out.

use icgraph_core::{FunctionId, ModuleId, Opcode, Program, ValueId};
use icgraph_demangle::cpp::{class_name_from_vtable, is_constructor, is_destructor};
use icgraph_demangle::MethodName;

use super::hierarchy::ClassHierarchy;

fn is_structor(name: &str) -> bool {
    is_constructor(name) || is_destructor(name)
}

/// Returns true if `v` is the `this` parameter of the enclosing function,
/// either directly or reloaded from the slot it was spilled to.
pub fn same_this_ptr(program: &Program, this: ValueId, v: ValueId) -> bool {
    let target = program.strip_pointer_casts(v);
    if v == this || target == this {
        return true;
    }
    for &user in program.users(this) {
        let Some(Opcode::Store { value, ptr }) = program.opcode(user) else {
            continue;
        };
        if *value != this {
            continue;
        }
        let reloaded = program.users(*ptr).iter().any(|&load| {
            load == target
                && matches!(program.opcode(load), Some(Opcode::Load { ptr: p }) if p == ptr)
        });
        if reloaded {
            return true;
        }
    }
    false
}

/// Vtable global behind a stored `bitcast (gep @_ZTV..)` constant.
fn stored_vtable(program: &Program, value: ValueId) -> Option<&str> {
    let stripped = program.strip_pointer_casts(value);
    if !program.value(stripped).is_constant() {
        return None;
    }
    let gep = program.as_gep(stripped)?;
    let base = program.strip_pointer_casts(gep.base);
    let global = program.global(program.value(base).as_global()?);
    global.is_vtable().then_some(global.name.as_str())
}

fn scan_function(program: &Program, function: FunctionId, hierarchy: &mut ClassHierarchy) -> usize {
    let f = program.function(function);
    let Some(class) = MethodName::parse(&f.name).map(|m| m.class_name) else {
        return 0;
    };
    hierarchy.add_class(&class);
    let Some(&this) = f.params.first() else {
        return 0;
    };

    let mut added = 0;
    for inst in f.instructions() {
        match program.opcode(inst) {
            Some(Opcode::Call(call)) => {
                let Some(callee) = program.base_function(call.callee) else {
                    continue;
                };
                let callee_name = &program.function(callee).name;
                if !is_structor(callee_name) {
                    continue;
                }
                let index = usize::from(call.sret);
                let Some(&arg) = call.args.get(index) else {
                    continue;
                };
                if program.call_site(program.strip_pointer_casts(arg)).is_some() {
                    continue;
                }
                if !same_this_ptr(program, this, arg) {
                    continue;
                }
                if let Some(base) = MethodName::parse(callee_name) {
                    added += usize::from(hierarchy.add_inheritance(&class, &base.class_name));
                }
            }
            Some(Opcode::Store { value, .. }) => {
                let Some(vtable) = stored_vtable(program, *value) else {
                    continue;
                };
                if let Some(base) = class_name_from_vtable(vtable) {
                    added += usize::from(hierarchy.add_inheritance(&class, &base));
                }
            }
            _ => {}
        }
    }
    added
}

/// Scans every defined constructor and destructor of a module. Returns
/// the number of new inheritance edges.
pub fn scan_structors(
    program: &Program,
    module: ModuleId,
    hierarchy: &mut ClassHierarchy,
) -> usize {
    program
        .module(module)
        .functions
        .iter()
        .filter(|&&f| {
            let function = program.function(f);
            !function.is_declaration() && is_structor(&function.name)
        })
        .map(|&f| scan_function(program, f, hierarchy))
        .sum()
}
