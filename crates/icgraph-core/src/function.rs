//! Function and linkage representation.

use crate::{BasicBlock, ModuleId, TypeId, ValueId};

/// Symbol linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    /// Visible to other modules.
    #[default]
    External,
    /// Weak definition that may be overridden at link time.
    Weak,
    /// One-definition-rule linkage (inline functions, templates).
    LinkOnce,
    /// Local to the module.
    Internal,
    /// Local and not even in the symbol table.
    Private,
}

impl Linkage {
    /// Returns true if other modules can reference the symbol.
    pub fn is_external(self) -> bool {
        matches!(self, Linkage::External | Linkage::Weak | Linkage::LinkOnce)
    }
}

/// A function, defined (with blocks) or declared (without).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    /// Symbol name, possibly mangled.
    pub name: String,
    /// Function type.
    pub ty: TypeId,
    /// Owning module.
    pub module: ModuleId,
    pub linkage: Linkage,
    /// Argument values, one per parameter.
    pub params: Vec<ValueId>,
    /// Body; empty for declarations.
    pub blocks: Vec<BasicBlock>,
    /// The function's address as a value.
    pub value: ValueId,
    /// The address is used other than as a direct callee.
    pub address_taken: bool,
}

impl Function {
    /// Returns true if the function has no body in this program.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Compiler intrinsics (`llvm.*`).
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }

    /// Returns true if the function is visible across modules.
    pub fn has_external_linkage(&self) -> bool {
        self.linkage.is_external()
    }

    /// Iterates over the body's instructions in program order.
    pub fn instructions(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.blocks
            .iter()
            .flat_map(|bb| bb.instructions.iter().copied())
    }

    /// Number of instructions in the body.
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }
}
