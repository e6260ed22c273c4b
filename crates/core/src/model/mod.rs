//! Core data model: the lifted IR and the program containers it lives in.
//!
//! Programs arrive already lifted. A `Program` owns its memory segments and
//! functions; each `Function` owns its `IrBlock`s, and a `JumpSite` borrows
//! one block while a resolution attempt is in flight.

pub(crate) mod ir;
mod program;

pub use ir::{BinOp, Expr, IrBlock, JumpKind, Stmt, Tmp};
pub use program::{Arch, Function, JumpSite, Program, Segment};
