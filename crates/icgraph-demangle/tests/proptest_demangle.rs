//! Property-based tests for symbol demangling.
//!
//! These tests verify that the demangler handles arbitrary input safely and
//! that generated nested names, constructors and vtable symbols demangle to
//! the expected class and method parts.

use proptest::prelude::*;

use icgraph_demangle::cpp::{self, MethodName};
use icgraph_demangle::{demangle, demangle_or_original};

fn source_name(s: &str) -> String {
    format!("{}{}", s.len(), s)
}

// =============================================================================
// Demangling Safety Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(5000))]

    /// Demangling arbitrary strings never panics.
    #[test]
    fn demangle_never_panics(s in ".*") {
        let _ = demangle(&s);
    }

    /// Arbitrary `_Z`-prefixed input never panics.
    #[test]
    fn itanium_prefix_handling(suffix in "[a-zA-Z0-9_]*") {
        let _ = demangle(&format!("_Z{}", suffix));
    }

    /// demangle_or_original returns original for non-mangled names.
    #[test]
    fn demangle_or_original_preserves_unmangled(s in "[a-zA-Z_][a-zA-Z0-9_]*") {
        if !s.starts_with("_Z") {
            prop_assert_eq!(demangle_or_original(&s), s);
        }
    }

    /// Demangling is deterministic.
    #[test]
    fn demangle_is_deterministic(s in "_Z[A-Za-z0-9_]{0,24}") {
        prop_assert_eq!(demangle(&s), demangle(&s));
    }
}

// =============================================================================
// Structural Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// `N <scope>... <name> E v` demangles to the `::`-joined path.
    #[test]
    fn nested_names_join_with_scope(
        parts in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..5)
    ) {
        let inner: String = parts.iter().map(|p| source_name(p)).collect();
        let mangled = format!("_ZN{}Ev", inner);
        let expected = format!("{}()", parts.join("::"));
        prop_assert_eq!(demangle(&mangled), Some(expected));
    }

    /// Member functions split into their class and method.
    #[test]
    fn member_functions_split(
        class in "[A-Z][a-zA-Z0-9]{0,8}",
        method in "[a-z][a-z0-9_]{0,8}",
    ) {
        let mangled = format!("_ZN{}{}Ei", source_name(&class), source_name(&method));
        let parsed = MethodName::parse(&mangled).unwrap();
        prop_assert_eq!(parsed.class_name, class);
        prop_assert_eq!(parsed.method, method);
    }

    /// Every constructor and destructor variant is recognized.
    #[test]
    fn ctor_dtor_variants(
        class in "[A-Z][a-zA-Z0-9]{0,8}",
        ctor in prop::sample::select(vec!["C1", "C2", "C3"]),
        dtor in prop::sample::select(vec!["D0", "D1", "D2"]),
    ) {
        let scope = source_name(&class);
        let ctor_sym = format!("_ZN{}{}Ev", scope, ctor);
        let dtor_sym = format!("_ZN{}{}Ev", scope, dtor);
        prop_assert!(cpp::is_constructor(&ctor_sym));
        prop_assert!(cpp::is_destructor(&dtor_sym));
    }

    /// Vtable symbols name their class, with or without a namespace.
    #[test]
    fn vtable_class_names(
        ns in "[a-z][a-z0-9]{0,6}",
        class in "[A-Z][a-zA-Z0-9]{0,8}",
    ) {
        let plain = format!("_ZTV{}", source_name(&class));
        prop_assert_eq!(cpp::class_name_from_vtable(&plain), Some(class.clone()));

        let nested = format!("_ZTVN{}{}E", source_name(&ns), source_name(&class));
        prop_assert_eq!(cpp::class_name_from_vtable(&nested), Some(format!("{}::{}", ns, class)));
    }

    /// Thunks resolve to the same method as their target.
    #[test]
    fn thunks_keep_method(
        class in "[A-Z][a-zA-Z0-9]{0,8}",
        method in "[a-z][a-z0-9_]{0,8}",
        offset in 1u32..256,
    ) {
        let target = format!("N{}{}Ev", source_name(&class), source_name(&method));
        let thunk = MethodName::parse(&format!("_ZThn{}_{}", offset, target)).unwrap();
        let direct = MethodName::parse(&format!("_Z{}", target)).unwrap();
        prop_assert_eq!(thunk.thunk, Some(cpp::ThunkKind::NonVirtual));
        prop_assert_eq!(thunk.method, direct.method);
        prop_assert_eq!(thunk.class_name, direct.class_name);
    }
}
