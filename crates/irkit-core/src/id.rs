//! Stable ID newtypes for IR entities.
//!
//! All IDs are distinct newtype wrappers over `u32` indexing into a
//! function's arenas, providing type safety so that an `OpId` cannot be
//! accidentally used where a `BlockId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an operation within its function's op arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u32);

/// Identity of a basic block within its function's block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Position of a function argument in the function signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgId(pub u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ArgId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ArgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(format!("{}", OpId(7)), "7");
        assert_eq!(format!("{}", BlockId(3)), "3");
        assert_eq!(format!("{}", ArgId(0)), "0");
    }

    #[test]
    fn serde_roundtrip() {
        let op = OpId(42);
        let json = serde_json::to_string(&op).unwrap();
        let back: OpId = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
