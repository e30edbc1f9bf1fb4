//! Structural hashing of types and function signatures.
//!
//! Type confinement is keyed by structural type identity rather than by
//! [`TypeId`], because the same source type may be printed under different
//! names in different modules (`%struct.S` and `%struct.S.12`) and may
//! appear as an anonymous literal struct. Hashes are computed over a
//! normalised textual form:
//!
//! - named structs hash as `<name without numeric suffix>,<field count>`
//! - anonymous structs hash as the first named struct with the same
//!   field-kind signature, or as their signature when none matches
//! - every other type hashes its printed form with suffixes and
//!   whitespace removed
//!
//! Function signatures additionally drop a leading `%class.X*` receiver so
//! that a method and a call through a base-class pointer compare equal.

use std::fmt;
use std::hash::Hasher;

use indexmap::{IndexMap, IndexSet};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHasher;
use serde::Serialize;

use icgraph_core::{CallSite, FunctionId, GepIndex, Program, Type, TypeId, TypeTable};

/// Numeric uniquing suffixes added when modules are linked: `.12`.
static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.[0-9]+\b").expect("numeric suffix regex")
});

/// Leading `this` parameter of a method type.
static THIS_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^(]*)\(%class\.[^*,()]+\*,?").expect("receiver regex")
});

/// Structural identity of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeHash(pub u64);

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identity of a normalised function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SignatureHash(pub u64);

/// Field position within a type layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FieldIndex {
    /// A specific field or element.
    At(u64),
    /// Any field; used for whole-object facts and dynamic indices.
    All,
}

impl FieldIndex {
    /// Field selected by a GEP index.
    ///
    /// Negative and dynamic indices select no particular field.
    pub fn from_gep(index: GepIndex) -> Self {
        match index.as_const() {
            Some(i) if i >= 0 => FieldIndex::At(i as u64),
            _ => FieldIndex::All,
        }
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldIndex::At(i) => write!(f, "{i}"),
            FieldIndex::All => f.write_str("*"),
        }
    }
}

/// A (container type, field) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeLayer {
    pub ty: TypeHash,
    pub field: FieldIndex,
}

impl TypeLayer {
    pub fn new(ty: TypeHash, field: FieldIndex) -> Self {
        Self { ty, field }
    }

    /// The same type with any field.
    pub fn whole(self) -> Self {
        Self {
            ty: self.ty,
            field: FieldIndex::All,
        }
    }
}

impl fmt::Display for TypeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ty, self.field)
    }
}

fn fx_hash(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(s.as_bytes());
    hasher.finish()
}

/// Drops a trailing `.N` uniquing suffix unless the struct is anonymous.
pub fn valid_struct_name(name: &str) -> &str {
    if name.contains(".anon") {
        return name;
    }
    match name.rfind('.') {
        Some(dot)
            if dot + 1 < name.len() && name[dot + 1..].bytes().all(|b| b.is_ascii_digit()) =>
        {
            &name[..dot]
        }
        _ => name,
    }
}

/// Printed type with uniquing suffixes and whitespace removed.
pub fn normalize_type_string(printed: &str) -> String {
    NUMERIC_SUFFIX
        .replace_all(printed, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Printed function type with the receiver parameter also removed.
pub fn normalize_signature(printed: &str) -> String {
    let stripped = NUMERIC_SUFFIX.replace_all(printed, "");
    let without_this = THIS_PARAM.replace(&stripped, "${1}(");
    without_this.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Signature hash of a function type.
pub fn signature_of_type(types: &TypeTable, fn_ty: TypeId) -> SignatureHash {
    SignatureHash(fx_hash(&normalize_signature(&types.display(fn_ty))))
}

/// Signature hash of a function.
pub fn function_signature(program: &Program, function: FunctionId) -> SignatureHash {
    signature_of_type(program.types(), program.function(function).ty)
}

/// Signature hash of the function type a call site expects.
pub fn call_signature(program: &Program, call: &CallSite<'_>) -> SignatureHash {
    signature_of_type(program.types(), call.fn_ty())
}

/// Computes [`TypeHash`]es with anonymous-struct deduplication.
#[derive(Debug, Clone, Default)]
pub struct TypeHasher {
    /// Field-kind signature to named structs with that shape, in
    /// declaration order.
    elements_struct_names: IndexMap<String, IndexSet<String>>,
}

impl TypeHasher {
    /// Indexes every named struct of every module.
    pub fn from_program(program: &Program) -> Self {
        let types = program.types();
        let mut hasher = Self::default();
        for module in program.modules() {
            for &ty in &module.struct_types {
                hasher.register(types, ty);
            }
        }
        // Named structs no module claims, e.g. from deserialized programs.
        for (id, ty) in types.iter() {
            if matches!(ty, Type::Struct { name: Some(_), .. }) {
                hasher.register(types, id);
            }
        }
        hasher
    }

    fn register(&mut self, types: &TypeTable, ty: TypeId) {
        let Some(name) = types.struct_name(ty) else {
            return;
        };
        if matches!(types.get(ty), Type::Struct { opaque: true, .. }) {
            return;
        }
        let sig = types.field_kind_signature(ty);
        self.elements_struct_names
            .entry(sig)
            .or_default()
            .insert(name.to_string());
    }

    /// Named structs sharing a field-kind signature.
    pub fn structs_with_signature(&self, sig: &str) -> Option<&IndexSet<String>> {
        self.elements_struct_names.get(sig)
    }

    /// Structural hash of a type.
    pub fn hash(&self, types: &TypeTable, ty: TypeId) -> TypeHash {
        match types.get(ty) {
            Type::Struct { name, fields, .. } => {
                let count = fields.len();
                let key = match name {
                    Some(name) => format!("{},{}", valid_struct_name(name), count),
                    None => {
                        let sig = types.field_kind_signature(ty);
                        match self
                            .elements_struct_names
                            .get(&sig)
                            .and_then(|names| names.first())
                        {
                            Some(named) => format!("{},{}", valid_struct_name(named), count),
                            None => format!("anon{{{sig}}},{count}"),
                        }
                    }
                };
                TypeHash(fx_hash(&key))
            }
            _ => TypeHash(fx_hash(&normalize_type_string(&types.display(ty)))),
        }
    }

    /// Layer for a field of a type.
    pub fn layer(&self, types: &TypeTable, ty: TypeId, field: FieldIndex) -> TypeLayer {
        TypeLayer::new(self.hash(types, ty), field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icgraph_core::ProgramBuilder;

    #[test]
    fn test_valid_struct_name() {
        assert_eq!(valid_struct_name("struct.S.12"), "struct.S");
        assert_eq!(valid_struct_name("struct.S"), "struct.S");
        assert_eq!(valid_struct_name("struct.anon.3"), "struct.anon.3");
        assert_eq!(valid_struct_name("class.v2"), "class.v2");
        assert_eq!(valid_struct_name("struct.x."), "struct.x.");
    }

    #[test]
    fn test_normalize_signature() {
        assert_eq!(
            normalize_signature("void (%class.Derived.3*, i32)"),
            "void(i32)"
        );
        assert_eq!(normalize_signature("void (%class.Base*)"), "void()");
        assert_eq!(
            normalize_signature("i32 (%struct.S.1*, i8*, ...)"),
            "i32(%struct.S*,i8*,...)"
        );
        // Only a leading receiver is dropped.
        assert_eq!(
            normalize_signature("void (i32, %class.Base*)"),
            "void(i32,%class.Base*)"
        );
    }

    #[test]
    fn test_suffix_insensitive_struct_hash() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let i32_ty = pb.types().i32();
        let a = pb.add_struct(m, "struct.S", vec![i32_ty, i32_ty]).unwrap();
        let b = pb.add_struct(m, "struct.S.7", vec![i32_ty, i32_ty]).unwrap();
        let c = pb.add_struct(m, "struct.T", vec![i32_ty, i32_ty]).unwrap();
        let program = pb.build();

        let hasher = TypeHasher::from_program(&program);
        let types = program.types();
        assert_eq!(hasher.hash(types, a), hasher.hash(types, b));
        assert_ne!(hasher.hash(types, a), hasher.hash(types, c));
    }

    #[test]
    fn test_anonymous_struct_matches_named() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let i32_ty = pb.types().i32();
        let void_ptr = pb.types().void_ptr();
        let named = pb.add_struct(m, "struct.ops", vec![void_ptr, i32_ty]).unwrap();
        let anon = pb.types().anon_struct(vec![void_ptr, i32_ty]);
        let other = pb.types().anon_struct(vec![i32_ty, i32_ty, i32_ty]);
        let program = pb.build();

        let hasher = TypeHasher::from_program(&program);
        let types = program.types();
        assert_eq!(hasher.hash(types, anon), hasher.hash(types, named));
        assert_ne!(hasher.hash(types, other), hasher.hash(types, named));
        assert!(hasher.structs_with_signature("1513").is_some());
    }

    #[test]
    fn test_pointer_types_hash_by_print() {
        let mut pb = ProgramBuilder::new();
        let m = pb.add_module("a.c");
        let i32_ty = pb.types().i32();
        let s1 = pb.add_struct(m, "struct.S", vec![i32_ty]).unwrap();
        let s2 = pb.add_struct(m, "struct.S.2", vec![i32_ty]).unwrap();
        let p1 = pb.types().ptr(s1);
        let p2 = pb.types().ptr(s2);
        let program = pb.build();

        let hasher = TypeHasher::from_program(&program);
        assert_eq!(
            hasher.hash(program.types(), p1),
            hasher.hash(program.types(), p2)
        );
    }

    #[test]
    fn test_field_index_from_gep() {
        assert_eq!(FieldIndex::from_gep(GepIndex::Const(2)), FieldIndex::At(2));
        assert_eq!(FieldIndex::from_gep(GepIndex::Const(-1)), FieldIndex::All);
        assert_eq!(
            FieldIndex::from_gep(GepIndex::Dynamic(icgraph_core::ValueId(0))),
            FieldIndex::All
        );
    }
}
