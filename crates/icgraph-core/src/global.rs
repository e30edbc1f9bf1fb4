//! Global variables.

use crate::{Linkage, ModuleId, TypeId, ValueId};

/// A global variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalVariable {
    /// Symbol name (`_ZTV4Base`, `handlers`, ...).
    pub name: String,
    /// Owning module.
    pub module: ModuleId,
    /// Type of the stored object; the global's own value is a pointer to it.
    pub value_type: TypeId,
    /// The global's address as a value.
    pub value: ValueId,
    /// Constant initializer, absent for external declarations.
    pub initializer: Option<ValueId>,
    pub linkage: Linkage,
    /// Declared `const`.
    pub is_constant: bool,
}

impl GlobalVariable {
    pub fn has_initializer(&self) -> bool {
        self.initializer.is_some()
    }

    /// `_ZTV` symbols are C++ virtual tables.
    pub fn is_vtable(&self) -> bool {
        self.name.starts_with("_ZTV")
    }

    /// `_ZTI` symbols are C++ typeinfo objects.
    pub fn is_typeinfo(&self) -> bool {
        self.name.starts_with("_ZTI")
    }
}
