use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Tmp;

/// A point inside a block: the block address plus an optional statement index.
///
/// `stmt_idx == None` denotes the block as a whole, which is where block-scoped
/// values such as IR temporaries are recorded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CodeLocation {
    pub block_addr: u64,
    pub stmt_idx: Option<usize>,
}

impl CodeLocation {
    pub fn new(block_addr: u64, stmt_idx: Option<usize>) -> Self {
        Self { block_addr, stmt_idx }
    }

    /// Location standing for a whole block.
    pub fn block(block_addr: u64) -> Self {
        Self { block_addr, stmt_idx: None }
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stmt_idx {
            Some(idx) => write!(f, "{:#x}[{}]", self.block_addr, idx),
            None => write!(f, "{:#x}", self.block_addr),
        }
    }
}

/// The identity of a value at a location: a temporary slot or a register.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Tmp(Tmp),
    Register(String),
}

impl Variable {
    pub fn tmp(n: u32) -> Self {
        Variable::Tmp(Tmp(n))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Tmp(Tmp(n)) => write!(f, "t{n}"),
            Variable::Register(name) => f.write_str(name),
        }
    }
}
