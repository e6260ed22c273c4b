use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::BinOp;

/// Abstract value computed for a variable.
///
/// Only [`AbstractValue::Const`] is a usable jump target; the other variants
/// describe values the engine could not reduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractValue {
    /// Concrete bit-vector constant.
    Const { value: u64, bits: u32 },
    /// Unknown value with a descriptive name (e.g. an entry register).
    Symbolic(String),
    /// Operation over operands that did not fold.
    Compound { op: BinOp, lhs: Box<AbstractValue>, rhs: Box<AbstractValue> },
}

impl AbstractValue {
    pub fn constant(value: u64, bits: u32) -> Self {
        AbstractValue::Const { value: crate::model::ir::mask(value, bits), bits }
    }

    pub fn symbolic(name: impl Into<String>) -> Self {
        AbstractValue::Symbolic(name.into())
    }

    pub fn compound(op: BinOp, lhs: AbstractValue, rhs: AbstractValue) -> Self {
        AbstractValue::Compound { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn as_const(&self) -> Option<u64> {
        match self {
            AbstractValue::Const { value, .. } => Some(*value),
            AbstractValue::Symbolic(_) | AbstractValue::Compound { .. } => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Const { value, bits } => write!(f, "{value:#x}<{bits}>"),
            AbstractValue::Symbolic(name) => write!(f, "?{name}"),
            AbstractValue::Compound { op, lhs, rhs } => write!(f, "({lhs} {op:?} {rhs})"),
        }
    }
}
