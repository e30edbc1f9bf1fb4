//! Type representation.
//!
//! Types are interned in a [`TypeTable`]. Structural types (pointers,
//! functions, arrays, anonymous structs) are deduplicated by shape; named
//! structs are deduplicated by name and may be declared before their body
//! is known, which is how recursive structs are built.

use std::collections::HashMap;

use crate::{Error, Result, TypeId};

/// Coarse type category.
///
/// The discriminants follow the numbering of LLVM's `Type::TypeID` so that
/// field-kind signatures look familiar to anyone reading a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeKind {
    Half = 0,
    Float = 2,
    Double = 3,
    X86Fp80 = 4,
    Fp128 = 5,
    Void = 7,
    Label = 8,
    Integer = 13,
    Function = 14,
    Pointer = 15,
    Struct = 16,
    Array = 17,
    Vector = 18,
}

impl TypeKind {
    /// Numeric code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A type in the program representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    /// No value.
    Void,
    /// Integer of the given bit width.
    Integer { bits: u32 },
    /// Floating point of the given bit width.
    Float { bits: u32 },
    /// Typed pointer.
    Pointer { pointee: TypeId },
    /// Function signature.
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
    },
    /// Struct, named (`struct.S`, `class.Base`) or anonymous.
    Struct {
        name: Option<String>,
        fields: Vec<TypeId>,
        opaque: bool,
    },
    /// Fixed-length array.
    Array { element: TypeId, len: u64 },
    /// Fixed-length vector.
    Vector { element: TypeId, len: u64 },
    /// Basic block label.
    Label,
}

impl Type {
    /// Returns the coarse kind of this type.
    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Void => TypeKind::Void,
            Type::Integer { .. } => TypeKind::Integer,
            Type::Float { bits: 16 } => TypeKind::Half,
            Type::Float { bits: 32 } => TypeKind::Float,
            Type::Float { bits: 64 } => TypeKind::Double,
            Type::Float { bits: 80 } => TypeKind::X86Fp80,
            Type::Float { .. } => TypeKind::Fp128,
            Type::Pointer { .. } => TypeKind::Pointer,
            Type::Function { .. } => TypeKind::Function,
            Type::Struct { .. } => TypeKind::Struct,
            Type::Array { .. } => TypeKind::Array,
            Type::Vector { .. } => TypeKind::Vector,
            Type::Label => TypeKind::Label,
        }
    }
}

/// Interning table for all types of a program.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeTable {
    types: Vec<Type>,
    #[cfg_attr(feature = "serde", serde(skip))]
    interned: HashMap<Type, TypeId>,
    #[cfg_attr(feature = "serde", serde(skip))]
    named: HashMap<String, TypeId>,
}

impl TypeTable {
    /// Creates an empty type table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no type has been interned.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the type for an id.
    ///
    /// Ids handed out by this table are always valid.
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    /// Returns the type for an id, or `None` if the id is out of range.
    pub fn try_get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.index())
    }

    /// Iterates over all interned types.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    /// Interns a structural type.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Type::Struct {
            name: Some(name), ..
        } = &ty
        {
            if let Some(&id) = self.named.get(name) {
                return id;
            }
        }
        if let Some(&id) = self.interned.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        if let Type::Struct {
            name: Some(name), ..
        } = &ty
        {
            self.named.insert(name.clone(), id);
        } else {
            self.interned.insert(ty.clone(), id);
        }
        self.types.push(ty);
        id
    }

    /// Rebuilds the lookup indexes after deserialization.
    pub fn reindex(&mut self) {
        self.interned.clear();
        self.named.clear();
        for (i, ty) in self.types.iter().enumerate() {
            let id = TypeId(i as u32);
            match ty {
                Type::Struct {
                    name: Some(name), ..
                } => {
                    self.named.entry(name.clone()).or_insert(id);
                }
                _ => {
                    self.interned.entry(ty.clone()).or_insert(id);
                }
            }
        }
    }

    pub fn void(&mut self) -> TypeId {
        self.intern(Type::Void)
    }

    pub fn int(&mut self, bits: u32) -> TypeId {
        self.intern(Type::Integer { bits })
    }

    pub fn i8(&mut self) -> TypeId {
        self.int(8)
    }

    pub fn i32(&mut self) -> TypeId {
        self.int(32)
    }

    pub fn i64(&mut self) -> TypeId {
        self.int(64)
    }

    pub fn float(&mut self, bits: u32) -> TypeId {
        self.intern(Type::Float { bits })
    }

    pub fn ptr(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer { pointee })
    }

    /// `i8*`, the conventional untyped pointer.
    pub fn void_ptr(&mut self) -> TypeId {
        let i8 = self.i8();
        self.ptr(i8)
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>, variadic: bool) -> TypeId {
        self.intern(Type::Function {
            ret,
            params,
            variadic,
        })
    }

    pub fn array(&mut self, element: TypeId, len: u64) -> TypeId {
        self.intern(Type::Array { element, len })
    }

    pub fn vector(&mut self, element: TypeId, len: u64) -> TypeId {
        self.intern(Type::Vector { element, len })
    }

    /// Interns an anonymous struct with the given fields.
    pub fn anon_struct(&mut self, fields: Vec<TypeId>) -> TypeId {
        self.intern(Type::Struct {
            name: None,
            fields,
            opaque: false,
        })
    }

    /// Declares (or looks up) a named struct. A new struct starts opaque.
    pub fn named_struct(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        self.intern(Type::Struct {
            name: Some(name.to_string()),
            fields: Vec::new(),
            opaque: true,
        })
    }

    /// Sets the body of a named struct.
    pub fn set_struct_body(&mut self, id: TypeId, body: Vec<TypeId>) -> Result<()> {
        match self.types.get_mut(id.index()) {
            Some(Type::Struct {
                name: Some(_),
                fields,
                opaque,
            }) => {
                *fields = body;
                *opaque = false;
                Ok(())
            }
            Some(_) => Err(Error::NotANamedStruct(id)),
            None => Err(Error::InvalidType(id)),
        }
    }

    /// Declares a named struct and sets its body in one step.
    pub fn struct_type(&mut self, name: &str, fields: Vec<TypeId>) -> Result<TypeId> {
        let id = self.named_struct(name);
        self.set_struct_body(id, fields)?;
        Ok(id)
    }

    /// Looks up a named struct.
    pub fn lookup_struct(&self, name: &str) -> Option<TypeId> {
        self.named.get(name).copied()
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.get(id).kind()
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer { .. })
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Integer { .. })
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct { .. })
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Function { .. })
    }

    /// Struct, array or vector.
    pub fn is_composite(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Type::Struct { .. } | Type::Array { .. } | Type::Vector { .. }
        )
    }

    /// Pointee of a pointer type.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// Function type behind a function pointer type.
    pub fn function_pointee(&self, id: TypeId) -> Option<TypeId> {
        self.pointee(id).filter(|&p| self.is_function(p))
    }

    /// Name of a named struct.
    pub fn struct_name(&self, id: TypeId) -> Option<&str> {
        match self.get(id) {
            Type::Struct {
                name: Some(name), ..
            } => Some(name),
            _ => None,
        }
    }

    /// Field types of a struct.
    pub fn struct_fields(&self, id: TypeId) -> Option<&[TypeId]> {
        match self.get(id) {
            Type::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Number of fields (struct) or elements (array, vector).
    pub fn num_elements(&self, id: TypeId) -> u64 {
        match self.get(id) {
            Type::Struct { fields, .. } => fields.len() as u64,
            Type::Array { len, .. } | Type::Vector { len, .. } => *len,
            _ => 0,
        }
    }

    /// Type reached by indexing into a composite with `index`.
    ///
    /// Arrays and vectors accept any index (including a dynamic one, passed
    /// as `None`); structs require a constant in-range field number.
    pub fn element_type(&self, id: TypeId, index: Option<i64>) -> Option<TypeId> {
        match self.get(id) {
            Type::Struct { fields, .. } => {
                let i = usize::try_from(index?).ok()?;
                fields.get(i).copied()
            }
            Type::Array { element, .. } | Type::Vector { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// Return type, parameters and variadic flag of a function type.
    pub fn function_parts(&self, id: TypeId) -> Option<(TypeId, &[TypeId], bool)> {
        match self.get(id) {
            Type::Function {
                ret,
                params,
                variadic,
            } => Some((*ret, params, *variadic)),
            _ => None,
        }
    }

    /// Concatenated kind codes of a struct's fields.
    ///
    /// Two structs with the same layout shape share this signature, which
    /// is how anonymous structs are matched against named ones.
    pub fn field_kind_signature(&self, id: TypeId) -> String {
        let mut sig = String::new();
        if let Some(fields) = self.struct_fields(id) {
            for &field in fields {
                sig.push_str(&self.kind(field).code().to_string());
            }
        }
        sig
    }

    /// Prints a type in LLVM textual syntax, e.g. `i32 (%struct.S*, i8*)*`.
    pub fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(id, &mut out);
        out
    }

    fn write_type(&self, id: TypeId, out: &mut String) {
        match self.get(id) {
            Type::Void => out.push_str("void"),
            Type::Label => out.push_str("label"),
            Type::Integer { bits } => {
                out.push('i');
                out.push_str(&bits.to_string());
            }
            Type::Float { bits } => out.push_str(match bits {
                16 => "half",
                32 => "float",
                64 => "double",
                80 => "x86_fp80",
                _ => "fp128",
            }),
            Type::Pointer { pointee } => {
                self.write_type(*pointee, out);
                out.push('*');
            }
            Type::Function {
                ret,
                params,
                variadic,
            } => {
                self.write_type(*ret, out);
                out.push_str(" (");
                for (i, &param) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(param, out);
                }
                if *variadic {
                    if !params.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                }
                out.push(')');
            }
            Type::Struct {
                name: Some(name), ..
            } => {
                out.push('%');
                out.push_str(name);
            }
            Type::Struct {
                name: None, fields, ..
            } => {
                out.push_str("{ ");
                for (i, &field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(field, out);
                }
                out.push_str(" }");
            }
            Type::Array { element, len } => {
                out.push('[');
                out.push_str(&len.to_string());
                out.push_str(" x ");
                self.write_type(*element, out);
                out.push(']');
            }
            Type::Vector { element, len } => {
                out.push('<');
                out.push_str(&len.to_string());
                out.push_str(" x ");
                self.write_type(*element, out);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_dedups_structural_types() {
        let mut types = TypeTable::new();
        let a = types.i32();
        let b = types.int(32);
        assert_eq!(a, b);

        let p1 = types.ptr(a);
        let p2 = types.ptr(b);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_named_struct_recursive_body() {
        let mut types = TypeTable::new();
        let node = types.named_struct("struct.node");
        let node_ptr = types.ptr(node);
        let i32 = types.i32();
        types.set_struct_body(node, vec![i32, node_ptr]).unwrap();

        assert_eq!(types.struct_fields(node), Some(&[i32, node_ptr][..]));
        assert_eq!(types.named_struct("struct.node"), node);
        assert_eq!(types.display(node_ptr), "%struct.node*");
    }

    #[test]
    fn test_display_function_type() {
        let mut types = TypeTable::new();
        let i32 = types.i32();
        let s = types.struct_type("struct.S", vec![i32]).unwrap();
        let s_ptr = types.ptr(s);
        let fn_ty = types.function(i32, vec![s_ptr, i32], true);
        assert_eq!(types.display(fn_ty), "i32 (%struct.S*, i32, ...)");

        let fn_ptr = types.ptr(fn_ty);
        assert_eq!(types.function_pointee(fn_ptr), Some(fn_ty));
    }

    #[test]
    fn test_display_aggregates() {
        let mut types = TypeTable::new();
        let i8 = types.i8();
        let i8p = types.ptr(i8);
        let arr = types.array(i8p, 4);
        let anon = types.anon_struct(vec![arr, i8]);
        assert_eq!(types.display(anon), "{ [4 x i8*], i8 }");
    }

    #[test]
    fn test_field_kind_signature() {
        let mut types = TypeTable::new();
        let i32 = types.i32();
        let i8p = types.void_ptr();
        let s = types.anon_struct(vec![i32, i8p]);
        assert_eq!(types.field_kind_signature(s), "1315");
    }

    #[test]
    fn test_element_type() {
        let mut types = TypeTable::new();
        let i32 = types.i32();
        let i64 = types.i64();
        let s = types.struct_type("struct.P", vec![i32, i64]).unwrap();
        assert_eq!(types.element_type(s, Some(1)), Some(i64));
        assert_eq!(types.element_type(s, Some(2)), None);
        assert_eq!(types.element_type(s, None), None);

        let arr = types.array(i32, 8);
        assert_eq!(types.element_type(arr, None), Some(i32));
    }

    #[test]
    fn test_set_body_on_non_struct_fails() {
        let mut types = TypeTable::new();
        let i32 = types.i32();
        assert!(matches!(
            types.set_struct_body(i32, vec![]),
            Err(Error::NotANamedStruct(_))
        ));
    }
}
