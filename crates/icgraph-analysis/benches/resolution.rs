//! Benchmarks for whole-program call resolution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use icgraph_analysis::{analyze, AnalysisConfig, AnalysisKind};
use icgraph_core::{Linkage, Program, ProgramBuilder};

/// `modules` translation units, each with `handlers` callbacks stored into
/// an ops struct, a dispatcher calling through every field and a chain
/// of forwarding helpers that pass a callback down.
fn synthetic_program(modules: usize, handlers: usize) -> Program {
    let mut pb = ProgramBuilder::new();
    let void = pb.types().void();
    let i32_ty = pb.types().i32();
    let cb = pb.types().function(void, vec![i32_ty], false);
    let cb_ptr = pb.types().ptr(cb);
    let main_ty = pb.types().function(void, vec![], false);

    for m_idx in 0..modules {
        let m = pb.add_module(format!("unit{m_idx}.c"));
        let ops = pb
            .add_struct(m, &format!("struct.ops{m_idx}"), vec![cb_ptr; handlers])
            .unwrap();
        let ops_ptr = pb.types().ptr(ops);
        let forward_ty = pb.types().function(void, vec![cb_ptr, ops_ptr], false);

        let funcs: Vec<_> = (0..handlers)
            .map(|i| pb.define_function(m, format!("handler{m_idx}_{i}"), cb).unwrap())
            .collect();
        let forward: Vec<_> = (0..4)
            .map(|i| {
                let f = pb.define_function(m, format!("forward{m_idx}_{i}"), forward_ty).unwrap();
                pb.set_linkage(f, Linkage::Internal);
                f
            })
            .collect();
        let values: Vec<_> = funcs.iter().map(|&f| pb.function_value(f)).collect();
        let forward_values: Vec<_> = forward.iter().map(|&f| pb.function_value(f)).collect();

        for (i, &f) in forward.iter().enumerate() {
            let mut body = pb.body(f);
            let fp = body.param(0).unwrap();
            let obj = body.param(1).unwrap();
            let field = body.field(obj, (i % handlers) as u32).unwrap();
            body.store(fp, field);
            let next = forward_values[(i + 1) % forward_values.len()];
            body.call(next, &[fp, obj]).unwrap();
        }

        let main = pb
            .define_function(m, format!("dispatch{m_idx}"), main_ty)
            .unwrap();
        let mut body = pb.body(main);
        let obj = body.alloca(ops);
        let x = body.program().const_int(i32_ty, 0);
        for (i, &v) in values.iter().enumerate() {
            let field = body.field(obj, i as u32).unwrap();
            body.store(v, field);
        }
        body.call(forward_values[0], &[values[0], obj]).unwrap();
        for i in 0..handlers {
            let field = body.field(obj, i as u32).unwrap();
            let fp = body.load(field).unwrap();
            body.call(fp, &[x]).unwrap();
        }
    }

    pb.build()
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for &modules in &[4usize, 16, 64] {
        let program = synthetic_program(modules, 8);
        for kind in AnalysisKind::ALL {
            let config = AnalysisConfig::new().with_kind(kind);
            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), modules),
                &program,
                |b, program| b.iter(|| analyze(black_box(program), &config)),
            );
        }
    }

    group.finish();
}

fn bench_layer_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_type_layer");
    let program = synthetic_program(16, 8);

    for layers in [1usize, 2, 10] {
        let config = AnalysisConfig::new()
            .with_kind(AnalysisKind::MultiLayer)
            .with_max_type_layer(layers);
        group.bench_with_input(BenchmarkId::from_parameter(layers), &program, |b, program| {
            b.iter(|| analyze(black_box(program), &config))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_layer_limit);
criterion_main!(benches);
