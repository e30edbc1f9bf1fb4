//! Basic block representation.

use crate::{BlockId, ValueId};

/// A basic block: a straight-line sequence of instructions.
///
/// Instructions are stored as value ids; the instruction payload lives in
/// the program's value arena.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicBlock {
    /// Identifier within the enclosing function.
    pub id: BlockId,
    /// Instructions in program order.
    pub instructions: Vec<ValueId>,
}

impl BasicBlock {
    /// Creates a new empty basic block.
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
        }
    }

    /// Returns true if this block is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the number of instructions in this block.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns the last instruction in this block, if any.
    pub fn last_instruction(&self) -> Option<ValueId> {
        self.instructions.last().copied()
    }

    /// Returns the instruction following `inst` in this block.
    pub fn next_after(&self, inst: ValueId) -> Option<ValueId> {
        let pos = self.instructions.iter().position(|&i| i == inst)?;
        self.instructions.get(pos + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_after() {
        let mut bb = BasicBlock::new(BlockId::ENTRY);
        bb.instructions = vec![ValueId(4), ValueId(7), ValueId(9)];
        assert_eq!(bb.next_after(ValueId(4)), Some(ValueId(7)));
        assert_eq!(bb.next_after(ValueId(9)), None);
        assert_eq!(bb.next_after(ValueId(1)), None);
        assert_eq!(bb.last_instruction(), Some(ValueId(9)));
    }
}
