#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use icgraph_analysis::{analyze, AnalysisConfig, AnalysisKind};
use icgraph_core::{Program, ProgramBuilder};
use serde_json::Value;

/// A small well-formed program whose encoded ids are then perturbed.
#[derive(Debug, Arbitrary)]
struct FuzzedProgram {
    callbacks: u8,
    fields: u8,
    kind: u8,
    edits: Vec<Edit>,
}

/// Overwrites the `position`-th number of the encoded document.
#[derive(Debug, Arbitrary)]
struct Edit {
    position: u16,
    value: u32,
}

impl FuzzedProgram {
    fn build(&self) -> Option<Program> {
        let callbacks = usize::from(self.callbacks % 6) + 1;
        let fields = u32::from(self.fields % 4) + 1;

        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("fuzz.c");
        let void = pb.types().void();
        let i32_ty = pb.types().i32();
        let cb = pb.types().function(void, vec![i32_ty], false);
        let cb_ptr = pb.types().ptr(cb);
        let ops = pb.add_struct(m, "struct.ops", vec![cb_ptr; fields as usize]).ok()?;
        let main_ty = pb.types().function(void, vec![], false);

        let funcs = (0..callbacks)
            .map(|i| pb.define_function(m, format!("cb{i}"), cb))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let values: Vec<_> = funcs.iter().map(|&f| pb.function_value(f)).collect();
        let main = pb.define_function(m, "main", main_ty).ok()?;

        let mut body = pb.body(main);
        let x = body.program().const_int(i32_ty, 1);
        let obj = body.alloca(ops);
        let slot = body.alloca(cb_ptr);
        for (i, &v) in values.iter().enumerate() {
            let field = body.field(obj, i as u32 % fields).ok()?;
            body.store(v, field);
        }
        body.store(values[0], slot);
        for i in 0..fields {
            let field = body.field(obj, i).ok()?;
            let fp = body.load(field).ok()?;
            body.call(fp, &[x]).ok()?;
        }
        let fp = body.load(slot).ok()?;
        body.call(fp, &[x]).ok()?;
        Some(pb.build())
    }
}

fn count_numbers(value: &Value) -> usize {
    match value {
        Value::Number(_) => 1,
        Value::Array(items) => items.iter().map(count_numbers).sum(),
        Value::Object(map) => map.values().map(count_numbers).sum(),
        _ => 0,
    }
}

/// Replaces the `n`-th number in document order.
fn replace_nth(value: &mut Value, n: &mut usize, with: u32) -> bool {
    match value {
        Value::Number(_) if *n == 0 => {
            *value = Value::from(with);
            true
        }
        Value::Number(_) => {
            *n -= 1;
            false
        }
        Value::Array(items) => items.iter_mut().any(|v| replace_nth(v, n, with)),
        Value::Object(map) => map.values_mut().any(|v| replace_nth(v, n, with)),
        _ => false,
    }
}

fn perturb(document: &mut Value, edits: &[Edit]) {
    let total = count_numbers(document);
    if total == 0 {
        return;
    }
    for edit in edits.iter().take(16) {
        let mut n = usize::from(edit.position) % total;
        replace_nth(document, &mut n, edit.value);
    }
}

fuzz_target!(|input: FuzzedProgram| {
    let Some(program) = input.build() else {
        return;
    };
    let Ok(json) = program.to_json() else {
        return;
    };
    let Ok(mut document) = serde_json::from_str::<Value>(&json) else {
        return;
    };
    perturb(&mut document, &input.edits);

    let Ok(program) = Program::from_json(&document.to_string()) else {
        return;
    };
    let kind = AnalysisKind::ALL[usize::from(input.kind) % AnalysisKind::ALL.len()];
    let ctx = analyze(&program, &AnalysisConfig::new().with_kind(kind));
    let _ = ctx.call_graph().sccs();
});
