//! # icgraph-core
//!
//! Typed SSA program representation consumed by the call-graph resolver.
//! A [`Program`] holds one or more modules whose functions, globals and
//! values share program-wide arenas, so every entity has a stable id for
//! the whole analysis run.

pub mod basic_block;
pub mod builder;
pub mod error;
pub mod function;
pub mod global;
pub mod ids;
pub mod instruction;
pub mod program;
pub mod types;
mod validate;
pub mod value;

pub use basic_block::BasicBlock;
pub use builder::{FunctionBuilder, ProgramBuilder};
pub use error::{Error, Result};
pub use function::{Function, Linkage};
pub use global::GlobalVariable;
pub use ids::{BlockId, FunctionId, GlobalId, ModuleId, TypeId, ValueId};
pub use instruction::{CallData, CastOp, GepIndex, Instruction, Opcode, SourceLoc};
pub use program::{CallSite, GepView, Module, Program};
pub use types::{Type, TypeKind, TypeTable};
pub use value::{ConstExpr, Constant, Value, ValueKind};
