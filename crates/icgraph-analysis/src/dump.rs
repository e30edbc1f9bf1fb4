//! Text dump of resolved indirect calls.
//!
//! One line per indirect or virtual call site with at least one callee:
//!
//! ```text
//! net/dev.c:812:9|dev_open,dev_close
//! <unknown>:0:0|handler
//! ```

use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use icgraph_core::{FunctionId, Program, ValueId};

use crate::{GlobalContext, Result};

static CLONE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\.[0-9]+)+$").expect("clone suffix regex"));

/// Function name without trailing `.N` clone suffixes.
pub fn display_name(name: &str) -> &str {
    match CLONE_SUFFIX.find(name) {
        Some(m) if m.start() > 0 => &name[..m.start()],
        _ => name,
    }
}

/// `file:line:col` of a call site, or `<unknown>:0:0`.
pub fn call_location(program: &Program, call: ValueId) -> String {
    program
        .call_site(call)
        .and_then(|site| site.loc())
        .map(|loc| loc.to_string())
        .unwrap_or_else(|| "<unknown>:0:0".to_string())
}

fn format_line<'a>(
    program: &Program,
    call: ValueId,
    callees: impl Iterator<Item = &'a FunctionId>,
) -> String {
    let names: Vec<&str> = callees
        .map(|&f| display_name(&program.function(f).name))
        .collect();
    format!("{}|{}", call_location(program, call), names.join(","))
}

/// Writes every resolved indirect and virtual call of `ctx` to `out`, in
/// discovery order. Returns the number of lines written.
pub fn write_indirect_calls<W: Write>(
    program: &Program,
    ctx: &GlobalContext,
    out: &mut W,
) -> Result<usize> {
    let mut lines = 0;
    for (call, callees) in ctx.all_callees() {
        if callees.is_empty() {
            continue;
        }
        if !ctx.indirect_calls().contains(&call) && !ctx.virtual_calls().contains(&call) {
            continue;
        }
        writeln!(out, "{}", format_line(program, call, callees.iter()))?;
        lines += 1;
    }
    out.flush()?;
    Ok(lines)
}

/// [`write_indirect_calls`] into a string.
pub fn indirect_calls_to_string(program: &Program, ctx: &GlobalContext) -> Result<String> {
    let mut buf = Vec::new();
    write_indirect_calls(program, ctx, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::CallGraphPass;
    use crate::driver::run_to_fixpoint;
    use crate::signature::SignatureMatcher;
    use icgraph_core::ProgramBuilder;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_name_strips_clone_suffixes() {
        assert_eq!(display_name("handler.12"), "handler");
        assert_eq!(display_name("handler.1.2"), "handler");
        assert_eq!(display_name("handler"), "handler");
        assert_eq!(display_name("v2.handler"), "v2.handler");
        assert_eq!(display_name(".7"), ".7");
    }

    #[test]
    fn test_dump_writes_resolved_indirect_calls_only() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let fn_ptr = pb.types().ptr(fn_ty);
        let i32_ty = pb.types().i32();
        let other_ty = pb.types().function(i32_ty, vec![], false);
        let other_ptr = pb.types().ptr(other_ty);

        let main = pb.define_function(m, "main", fn_ty).unwrap();
        let cb = pb.define_function(m, "cb.3", fn_ty).unwrap();
        let helper = pb.define_function(m, "helper", fn_ty).unwrap();
        let (cb_v, helper_v) = (pb.function_value(cb), pb.function_value(helper));

        let mut body = pb.body(main);
        body.call(helper_v, &[]).unwrap();
        let slot = body.alloca(fn_ptr);
        body.store(cb_v, slot);
        let fp = body.load(slot).unwrap();
        body.at("src/main.c", 14, 5);
        body.call(fp, &[]).unwrap();
        let unresolved_slot = body.alloca(other_ptr);
        let other_fp = body.load(unresolved_slot).unwrap();
        body.call(other_fp, &[]).unwrap();
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        run_to_fixpoint(&mut CallGraphPass::new(SignatureMatcher::new()), &program, &mut ctx);

        let dump = indirect_calls_to_string(&program, &ctx).unwrap();
        assert_eq!(dump, "src/main.c:14:5|cb\n");
    }

    #[test]
    fn test_missing_location() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let void = pb.types().void();
        let fn_ty = pb.types().function(void, vec![], false);
        let fn_ptr = pb.types().ptr(fn_ty);
        let main = pb.define_function(m, "main", fn_ty).unwrap();
        let a = pb.define_function(m, "a", fn_ty).unwrap();
        let b = pb.define_function(m, "b", fn_ty).unwrap();
        let (a_v, b_v) = (pb.function_value(a), pb.function_value(b));

        let mut body = pb.body(main);
        let slot = body.alloca(fn_ptr);
        body.store(a_v, slot);
        body.store(b_v, slot);
        let fp = body.load(slot).unwrap();
        body.call(fp, &[]).unwrap();
        let program = pb.build();

        let mut ctx = GlobalContext::new(&program);
        run_to_fixpoint(&mut CallGraphPass::new(SignatureMatcher::new()), &program, &mut ctx);

        let mut out = Vec::new();
        assert_eq!(write_indirect_calls(&program, &ctx, &mut out).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "<unknown>:0:0|a,b\n");
    }
}
