//! C++ naming helpers built on the demangler.
//!
//! Class-hierarchy recovery works on demangled strings: it needs the class
//! a method belongs to, the bare method name, whether a symbol is a
//! constructor, destructor or thunk, and the class a vtable describes.

use crate::demangle;

/// Name of the runtime function that fills pure virtual slots.
pub const PURE_VIRTUAL: &str = "__cxa_pure_virtual";

const VIRTUAL_THUNK: &str = "virtual thunk to ";
const NON_VIRTUAL_THUNK: &str = "non-virtual thunk to ";

/// Kind of `this`-adjusting thunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThunkKind {
    /// Adjusts `this` by an offset read from the vtable.
    Virtual,
    /// Adjusts `this` by a fixed offset.
    NonVirtual,
}

/// A demangled member function split into class and method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodName {
    /// Qualified class (or namespace) part, e.g. `ns::Base`. Empty for free
    /// functions.
    pub class_name: String,
    /// Method name without parameters, e.g. `method` or `~Base`.
    pub method: String,
    /// Set when the symbol is a thunk to the method.
    pub thunk: Option<ThunkKind>,
}

impl MethodName {
    /// Demangles `symbol` and splits it.
    pub fn parse(symbol: &str) -> Option<Self> {
        let demangled = demangle(symbol)?;
        Some(Self::from_demangled(&demangled))
    }

    /// Splits an already-demangled name.
    pub fn from_demangled(demangled: &str) -> Self {
        let (thunk, rest) = if let Some(rest) = demangled.strip_prefix(NON_VIRTUAL_THUNK) {
            (Some(ThunkKind::NonVirtual), rest)
        } else if let Some(rest) = demangled.strip_prefix(VIRTUAL_THUNK) {
            (Some(ThunkKind::Virtual), rest)
        } else {
            (None, demangled)
        };

        let qualified = before_params(rest);
        let (class_name, method) = match rsplit_scope(qualified) {
            Some((class, method)) => (class.to_string(), method.to_string()),
            None => (String::new(), qualified.to_string()),
        };
        Self {
            class_name,
            method,
            thunk,
        }
    }

    /// Class name with template arguments and namespaces removed.
    pub fn bare_class(&self) -> &str {
        strip_namespace(strip_template_args(&self.class_name))
    }

    /// `Base::Base`.
    pub fn is_constructor(&self) -> bool {
        let class = self.bare_class();
        !class.is_empty() && self.method == class
    }

    /// `Base::~Base`.
    pub fn is_destructor(&self) -> bool {
        let class = self.bare_class();
        !class.is_empty()
            && self
                .method
                .strip_prefix('~')
                .is_some_and(|rest| rest == class)
    }
}

/// Class described by a vtable symbol (`_ZTV4Base` gives `Base`).
pub fn class_name_from_vtable(symbol: &str) -> Option<String> {
    if !symbol.starts_with("_ZTV") {
        return None;
    }
    demangle(symbol)?
        .strip_prefix("vtable for ")
        .map(str::to_string)
}

/// Returns true for mangled constructor symbols.
pub fn is_constructor(symbol: &str) -> bool {
    symbol.starts_with("_Z") && MethodName::parse(symbol).is_some_and(|m| m.is_constructor())
}

/// Returns true for mangled destructor symbols.
pub fn is_destructor(symbol: &str) -> bool {
    symbol.starts_with("_Z") && MethodName::parse(symbol).is_some_and(|m| m.is_destructor())
}

/// Thunk kind of a mangled symbol, if it is a thunk.
pub fn thunk_kind(symbol: &str) -> Option<ThunkKind> {
    if !symbol.starts_with("_ZTh") && !symbol.starts_with("_ZTv") {
        return None;
    }
    MethodName::parse(symbol)?.thunk
}

/// Returns true if a demangled class name carries template arguments.
pub fn has_template_args(class_name: &str) -> bool {
    class_name.contains('<')
}

/// Drops everything from the first `<`: `Foo<int>` becomes `Foo`.
pub fn strip_template_args(name: &str) -> &str {
    match name.find('<') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// Keeps the last `::` component: `ns::Base` becomes `Base`.
pub fn strip_namespace(name: &str) -> &str {
    match rsplit_scope(name) {
        Some((_, last)) => last,
        None => name,
    }
}

/// Prefix of a demangled function before its parameter list.
///
/// Parentheses inside template arguments (function types) and the
/// `operator()` name are not mistaken for the parameter list.
fn before_params(demangled: &str) -> &str {
    let bytes = demangled.as_bytes();
    let mut angle = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => angle += 1,
            b'>' => angle -= 1,
            b'(' if angle == 0 => {
                if demangled[..i].ends_with("operator") && demangled[i..].starts_with("()") {
                    i += 2;
                    continue;
                }
                return &demangled[..i];
            }
            _ => {}
        }
        i += 1;
    }
    demangled
}

/// Splits at the last top-level `::`.
fn rsplit_scope(name: &str) -> Option<(&str, &str)> {
    let bytes = name.as_bytes();
    let mut angle = 0i32;
    let mut split = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'<' => angle += 1,
            b'>' => angle -= 1,
            b':' if angle == 0 && bytes[i + 1] == b':' => {
                split = Some(i);
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    split.map(|i| (&name[..i], &name[i + 2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_split() {
        let m = MethodName::parse("_ZN2ns4Base6methodEPi").unwrap();
        assert_eq!(m.class_name, "ns::Base");
        assert_eq!(m.method, "method");
        assert_eq!(m.bare_class(), "Base");
        assert_eq!(m.thunk, None);
    }

    #[test]
    fn test_template_class_split() {
        let m = MethodName::from_demangled("Box<std::pair<int, int>>::get() const");
        assert_eq!(m.class_name, "Box<std::pair<int, int>>");
        assert_eq!(m.method, "get");
        assert_eq!(m.bare_class(), "Box");
        assert!(has_template_args(&m.class_name));
    }

    #[test]
    fn test_call_operator_split() {
        let m = MethodName::from_demangled("Functor::operator()(int)");
        assert_eq!(m.class_name, "Functor");
        assert_eq!(m.method, "operator()");
    }

    #[test]
    fn test_constructors_and_destructors() {
        assert!(is_constructor("_ZN7DerivedC2Ev"));
        assert!(is_constructor("_ZN2ns7DerivedC1Ei"));
        assert!(!is_constructor("_ZN7Derived6methodEv"));
        assert!(is_destructor("_ZN7DerivedD2Ev"));
        assert!(!is_destructor("_ZN7DerivedC2Ev"));
        assert!(!is_constructor("main"));
    }

    #[test]
    fn test_thunks() {
        assert_eq!(thunk_kind("_ZThn8_N1C1fEv"), Some(ThunkKind::NonVirtual));
        assert_eq!(thunk_kind("_ZTv0_n24_N1C1fEv"), Some(ThunkKind::Virtual));
        assert_eq!(thunk_kind("_ZN1C1fEv"), None);

        let m = MethodName::parse("_ZThn8_N1C1fEv").unwrap();
        assert_eq!(m.class_name, "C");
        assert_eq!(m.method, "f");
    }

    #[test]
    fn test_vtable_class() {
        assert_eq!(class_name_from_vtable("_ZTV4Base").as_deref(), Some("Base"));
        assert_eq!(
            class_name_from_vtable("_ZTVN2ns7DerivedE").as_deref(),
            Some("ns::Derived")
        );
        assert_eq!(class_name_from_vtable("_ZTI4Base"), None);
    }

    #[test]
    fn test_strip_helpers() {
        assert_eq!(strip_namespace("a::b::C"), "C");
        assert_eq!(strip_namespace("C"), "C");
        assert_eq!(strip_template_args("Foo<int>"), "Foo");
        assert_eq!(strip_namespace(strip_template_args("ns::Foo<a::b>")), "Foo");
    }
}
