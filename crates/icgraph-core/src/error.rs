//! Error types for icgraph-core.

use thiserror::Error;

use crate::{BlockId, FunctionId, GlobalId, ModuleId, TypeId, ValueId};

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Type id does not belong to the table.
    #[error("invalid type id: {0}")]
    InvalidType(TypeId),

    /// Value id does not belong to the program.
    #[error("invalid value id: {0}")]
    InvalidValue(ValueId),

    /// Unnamed type refers to itself or to a type interned after it.
    #[error("type {0} refers forward outside a named struct")]
    ForwardTypeRef(TypeId),

    /// Function id does not belong to the program.
    #[error("invalid function id: {0}")]
    InvalidFunction(FunctionId),

    /// Global id does not belong to the program.
    #[error("invalid global id: {0}")]
    InvalidGlobal(GlobalId),

    /// Module id does not belong to the program.
    #[error("invalid module id: {0}")]
    InvalidModule(ModuleId),

    /// Block id does not name a block of the function.
    #[error("function {function} has no block {block}")]
    InvalidBlock { function: FunctionId, block: BlockId },

    /// Two records that must point at each other disagree.
    #[error("{value} is not the {expected}")]
    Inconsistent {
        value: ValueId,
        expected: &'static str,
    },

    /// Body requested on a type that is not a named struct.
    #[error("type {0} is not a named struct")]
    NotANamedStruct(TypeId),

    /// Load or GEP through a value that is not a pointer.
    #[error("value {value} of type `{ty}` is not a pointer")]
    NotAPointer { value: ValueId, ty: String },

    /// Call through a value that is not a function pointer.
    #[error("value {value} of type `{ty}` is not callable")]
    NotCallable { value: ValueId, ty: String },

    /// Function declared with a type that is not a function type.
    #[error("`{0}` is not a function type")]
    NotAFunctionType(String),

    /// GEP index does not select a field of the indexed type.
    #[error("index {index:?} is out of range for `{ty}`")]
    BadIndex { index: Option<i64>, ty: String },

    /// Parameter index beyond the function's arity.
    #[error("function {function} has no parameter {index}")]
    NoSuchParam { function: String, index: usize },

    /// Program JSON could not be decoded.
    #[cfg(feature = "serde")]
    #[error("malformed program: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
