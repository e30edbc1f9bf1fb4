#![no_main]

use libfuzzer_sys::fuzz_target;
use icgraph_analysis::dump::indirect_calls_to_string;
use icgraph_analysis::{analyze, AnalysisConfig, AnalysisKind};
use icgraph_core::Program;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    // Malformed documents must be rejected, not accepted and panic later
    let Ok(program) = Program::from_json(json) else {
        return;
    };

    // Keep each run cheap
    if program.value_count() > 4096 {
        return;
    }

    for kind in AnalysisKind::ALL {
        let ctx = analyze(&program, &AnalysisConfig::new().with_kind(kind));
        let _ = indirect_calls_to_string(&program, &ctx);
        let _ = ctx.call_graph().sccs();
    }
});
