#![no_main]

use libfuzzer_sys::fuzz_target;
use icgraph_demangle::cpp::{self, MethodName};
use icgraph_demangle::{demangle, demangle_or_original};

fuzz_target!(|data: &[u8]| {
    let Ok(symbol) = std::str::from_utf8(data) else {
        return;
    };

    // Demangling must never panic, with or without the Itanium prefix
    let _ = demangle(symbol);
    let _ = demangle(&format!("_Z{symbol}"));
    let _ = demangle_or_original(symbol);

    // Helpers used by class-hierarchy recovery
    if let Some(method) = MethodName::parse(symbol) {
        let _ = method.bare_class();
        let _ = method.is_constructor();
        let _ = method.is_destructor();
    }
    let _ = MethodName::from_demangled(symbol);
    let _ = cpp::class_name_from_vtable(&format!("_ZTV{symbol}"));
    let _ = cpp::thunk_kind(&format!("_ZThn8_{symbol}"));
    let _ = cpp::is_constructor(symbol);
    let _ = cpp::is_destructor(symbol);
    let _ = cpp::strip_namespace(cpp::strip_template_args(symbol));
});
