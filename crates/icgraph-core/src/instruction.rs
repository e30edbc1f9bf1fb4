//! Instruction representation.

use crate::{BlockId, FunctionId, TypeId, ValueId};

/// Cast operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CastOp {
    BitCast,
    PtrToInt,
    IntToPtr,
    AddrSpaceCast,
    Trunc,
    ZExt,
    SExt,
    /// Floating point and other value-changing conversions.
    Other,
}

impl CastOp {
    /// Returns true for casts that reinterpret a pointer without moving it.
    pub fn is_pointer_noop(self) -> bool {
        matches!(self, CastOp::BitCast | CastOp::AddrSpaceCast)
    }
}

/// One index of a `getelementptr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GepIndex {
    /// Compile-time constant index.
    Const(i64),
    /// Index computed at run time.
    Dynamic(ValueId),
}

impl GepIndex {
    /// Constant value, if known.
    pub fn as_const(self) -> Option<i64> {
        match self {
            GepIndex::Const(c) => Some(c),
            GepIndex::Dynamic(_) => None,
        }
    }
}

/// Source position attached to an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Operands of a call instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallData {
    /// Callee expression: a function constant for direct calls, any
    /// function-pointer value otherwise.
    pub callee: ValueId,
    /// Actual arguments.
    pub args: Vec<ValueId>,
    /// Declared function type at the call site.
    pub fn_ty: TypeId,
    /// First argument is a struct-return slot.
    pub sret: bool,
}

/// Instruction operation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    /// Stack slot of the given type.
    Alloca { allocated: TypeId },
    Load { ptr: ValueId },
    Store { value: ValueId, ptr: ValueId },
    GetElementPtr {
        source_ty: TypeId,
        base: ValueId,
        indices: Vec<GepIndex>,
    },
    Cast { op: CastOp, operand: ValueId },
    /// SSA join. Predecessor blocks are not tracked.
    Phi { incoming: Vec<ValueId> },
    Select {
        condition: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    Call(CallData),
    Unary { operand: ValueId },
    Binary { lhs: ValueId, rhs: ValueId },
    Return { value: Option<ValueId> },
    Branch {
        condition: Option<ValueId>,
        targets: Vec<BlockId>,
    },
    Unreachable,
}

impl Opcode {
    /// Value operands in operand order.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Opcode::Alloca { .. } | Opcode::Unreachable => Vec::new(),
            Opcode::Load { ptr } => vec![*ptr],
            Opcode::Store { value, ptr } => vec![*value, *ptr],
            Opcode::GetElementPtr { base, indices, .. } => {
                let mut ops = vec![*base];
                ops.extend(indices.iter().filter_map(|idx| match idx {
                    GepIndex::Dynamic(v) => Some(*v),
                    GepIndex::Const(_) => None,
                }));
                ops
            }
            Opcode::Cast { operand, .. } | Opcode::Unary { operand } => vec![*operand],
            Opcode::Phi { incoming } => incoming.clone(),
            Opcode::Select {
                condition,
                if_true,
                if_false,
            } => vec![*condition, *if_true, *if_false],
            Opcode::Call(call) => {
                let mut ops = call.args.clone();
                ops.push(call.callee);
                ops
            }
            Opcode::Binary { lhs, rhs } => vec![*lhs, *rhs],
            Opcode::Return { value } => value.iter().copied().collect(),
            Opcode::Branch { condition, .. } => condition.iter().copied().collect(),
        }
    }

    /// Returns true if this operation ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return { .. } | Opcode::Branch { .. } | Opcode::Unreachable
        )
    }
}

/// An instruction placed in a function body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Enclosing function.
    pub function: FunctionId,
    /// Enclosing block.
    pub block: BlockId,
    /// Operation and operands.
    pub opcode: Opcode,
    /// Debug location, if the front end emitted one.
    pub loc: Option<SourceLoc>,
}

impl Instruction {
    /// Returns the call operands if this is a call.
    pub fn as_call(&self) -> Option<&CallData> {
        match &self.opcode {
            Opcode::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Returns `(value, ptr)` if this is a store.
    pub fn as_store(&self) -> Option<(ValueId, ValueId)> {
        match self.opcode {
            Opcode::Store { value, ptr } => Some((value, ptr)),
            _ => None,
        }
    }

    /// Returns the pointer operand if this is a load.
    pub fn as_load(&self) -> Option<ValueId> {
        match self.opcode {
            Opcode::Load { ptr } => Some(ptr),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.opcode, Opcode::Call(_))
    }

    pub fn operands(&self) -> Vec<ValueId> {
        self.opcode.operands()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_operands_put_callee_last() {
        let call = Opcode::Call(CallData {
            callee: ValueId(9),
            args: vec![ValueId(1), ValueId(2)],
            fn_ty: TypeId(0),
            sret: false,
        });
        assert_eq!(call.operands(), vec![ValueId(1), ValueId(2), ValueId(9)]);
    }

    #[test]
    fn test_gep_operands_skip_constant_indices() {
        let gep = Opcode::GetElementPtr {
            source_ty: TypeId(0),
            base: ValueId(3),
            indices: vec![GepIndex::Const(0), GepIndex::Dynamic(ValueId(4))],
        };
        assert_eq!(gep.operands(), vec![ValueId(3), ValueId(4)]);
    }

    #[test]
    fn test_terminators() {
        assert!(Opcode::Return { value: None }.is_terminator());
        assert!(Opcode::Unreachable.is_terminator());
        assert!(!Opcode::Load { ptr: ValueId(0) }.is_terminator());
    }

    #[test]
    fn test_source_loc_display() {
        assert_eq!(SourceLoc::new("a.c", 12, 5).to_string(), "a.c:12:5");
    }
}
