//! Values: arguments, constants, globals, functions and instructions.

use crate::{CastOp, FunctionId, GepIndex, GlobalId, Instruction, TypeId, ValueId};

/// Constant expression.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstExpr {
    Cast {
        op: CastOp,
        operand: ValueId,
    },
    GetElementPtr {
        source_ty: TypeId,
        base: ValueId,
        indices: Vec<GepIndex>,
    },
}

/// Constant data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Null,
    Undef,
    Int(i64),
    /// Struct, array or vector initializer.
    Aggregate(Vec<ValueId>),
    Expr(ConstExpr),
}

impl Constant {
    /// Scalar data without operands (null, undef, integers).
    pub fn is_data(&self) -> bool {
        matches!(self, Constant::Null | Constant::Undef | Constant::Int(_))
    }

    /// Operand values of aggregates and constant expressions.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Constant::Null | Constant::Undef | Constant::Int(_) => Vec::new(),
            Constant::Aggregate(elements) => elements.clone(),
            Constant::Expr(ConstExpr::Cast { operand, .. }) => vec![*operand],
            Constant::Expr(ConstExpr::GetElementPtr { base, indices, .. }) => {
                let mut ops = vec![*base];
                ops.extend(indices.iter().filter_map(|idx| match idx {
                    GepIndex::Dynamic(v) => Some(*v),
                    GepIndex::Const(_) => None,
                }));
                ops
            }
        }
    }
}

/// What a value is.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    /// Formal parameter of a function.
    Argument { function: FunctionId, index: u32 },
    /// Address of a function.
    Function(FunctionId),
    /// Address of a global variable.
    Global(GlobalId),
    Constant(Constant),
    Instruction(Instruction),
}

/// A typed value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value {
    /// Type of the value.
    pub ty: TypeId,
    /// Optional source-level name (`%vtable`, `%fp`, ...).
    pub name: Option<String>,
    /// Kind and operands.
    pub kind: ValueKind,
}

impl Value {
    pub fn new(ty: TypeId, kind: ValueKind) -> Self {
        Self {
            ty,
            name: None,
            kind,
        }
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            ValueKind::Instruction(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match &self.kind {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionId> {
        match self.kind {
            ValueKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_global(&self) -> Option<GlobalId> {
        match self.kind {
            ValueKind::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn is_argument(&self) -> bool {
        matches!(self.kind, ValueKind::Argument { .. })
    }

    /// Constants, globals and function addresses.
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Constant(_) | ValueKind::Global(_) | ValueKind::Function(_)
        )
    }

    /// Returns true if the value's name contains `needle`.
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.as_deref().is_some_and(|n| n.contains(needle))
    }

    /// Values this value reads.
    pub fn operands(&self) -> Vec<ValueId> {
        match &self.kind {
            ValueKind::Instruction(inst) => inst.operands(),
            ValueKind::Constant(c) => c.operands(),
            ValueKind::Argument { .. } | ValueKind::Function(_) | ValueKind::Global(_) => {
                Vec::new()
            }
        }
    }
}
