//! Arena identifiers.
//!
//! Every entity in a [`Program`](crate::Program) lives in an arena and is
//! referred to by a small copyable index. Identity is stable for the
//! lifetime of the program.

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub u32);

        impl $name {
            /// Creates an identifier from a raw arena index.
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            /// Returns the arena index.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Identifies an interned type.
    TypeId,
    "ty"
);
arena_id!(
    /// Identifies a value: argument, constant, global, function or instruction.
    ValueId,
    "%v"
);
arena_id!(
    /// Identifies a function (defined or declared).
    FunctionId,
    "fn"
);
arena_id!(
    /// Identifies a global variable.
    GlobalId,
    "gv"
);
arena_id!(
    /// Identifies a module.
    ModuleId,
    "mod"
);
arena_id!(
    /// Identifies a basic block within its function.
    BlockId,
    "bb"
);

impl BlockId {
    /// The entry block of every function.
    pub const ENTRY: Self = Self(0);
}
