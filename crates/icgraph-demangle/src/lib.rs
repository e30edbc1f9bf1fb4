//! # icgraph-demangle
//!
//! Symbol demangling for the call-graph resolver.
//!
//! Only the Itanium C++ ABI (GCC, Clang) is supported, which is what the
//! class-hierarchy analysis needs to name classes, methods, constructors,
//! destructors and thunks. The [`cpp`] module layers those queries on top
//! of the raw demangler.

pub mod cpp;
mod itanium;

pub use cpp::{MethodName, ThunkKind, PURE_VIRTUAL};
pub use itanium::demangle_itanium;

/// Attempt to demangle a symbol name.
///
/// Returns the demangled name if successful, or None if the symbol
/// is not mangled or uses an unsupported scheme.
pub fn demangle(name: &str) -> Option<String> {
    demangle_itanium(name)
}

/// Demangle a symbol, returning the original if demangling fails.
pub fn demangle_or_original(name: &str) -> String {
    demangle(name).unwrap_or_else(|| name.to_string())
}

/// Returns true if the name looks like an Itanium mangled symbol.
pub fn is_mangled(name: &str) -> bool {
    name.starts_with("_Z")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_simple() {
        assert_eq!(demangle("_Z3fooi"), Some("foo(int)".to_string()));
    }

    #[test]
    fn test_demangle_or_original() {
        assert_eq!(demangle_or_original("main"), "main");
        assert_eq!(demangle_or_original("_ZN1A1fEv"), "A::f()");
    }

    #[test]
    fn test_is_mangled() {
        assert!(is_mangled("_ZTV4Base"));
        assert!(!is_mangled("printf"));
    }
}
