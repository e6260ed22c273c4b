// Shared fixtures for constjump-core integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use constjump_core::dataflow::{
    CompletedFunctions, PropagationEngine, PropagationError, PropagatorOptions, ReplacementMap,
};
use constjump_core::model::{
    BinOp, Expr, Function, IrBlock, JumpKind, Program, Segment, Stmt, Tmp,
};

pub const TEXT_BASE: u64 = 0x40_1000;
pub const RODATA_BASE: u64 = 0x40_2000;

/// `t5 = 0x401020; jmp t5` at 0x1000 inside function 0x1000.
pub fn single_jump_function(kind: JumpKind) -> Function {
    Function::new(0x1000).with_name("f").with_block(
        IrBlock::new(0x1000, 5, Expr::tmp(5), kind).with_stmts(vec![
            Stmt::IMark { addr: 0x1000, len: 5 },
            Stmt::WrTmp { tmp: Tmp(5), expr: Expr::Const(0x40_1020) },
        ]),
    )
}

pub fn single_jump_program(kind: JumpKind) -> Program {
    Program::new("single")
        .with_segment(Segment::code(TEXT_BASE, vec![0x90; 0x100]))
        .with_function(single_jump_function(kind))
}

fn words(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// A switch-style dispatch whose table base is set one block before the jump:
///
/// ```text
/// 0x401000: mov rax, 0x402000        ; jmp 0x401010
/// 0x401010: jmp [rax + 8]            ; -> 0x401200
/// 0x401100: ret
/// 0x401200: ret
/// ```
pub fn jump_table_program() -> Program {
    let dispatch = Function::new(TEXT_BASE)
        .with_name("dispatch")
        .with_block(
            IrBlock::new(TEXT_BASE, 0x10, Expr::Const(TEXT_BASE + 0x10), JumpKind::Jump)
                .with_stmts(vec![
                    Stmt::IMark { addr: TEXT_BASE, len: 7 },
                    Stmt::Put { reg: "rax".into(), expr: Expr::Const(RODATA_BASE) },
                ]),
        )
        .with_block(
            IrBlock::new(TEXT_BASE + 0x10, 4, Expr::tmp(2), JumpKind::Jump).with_stmts(vec![
                Stmt::IMark { addr: TEXT_BASE + 0x10, len: 4 },
                Stmt::WrTmp { tmp: Tmp(0), expr: Expr::reg("rax") },
                Stmt::WrTmp {
                    tmp: Tmp(1),
                    expr: Expr::binop(BinOp::Add, Expr::tmp(0), Expr::Const(8)),
                },
                Stmt::WrTmp { tmp: Tmp(2), expr: Expr::load(Expr::tmp(1)) },
            ]),
        )
        .with_block(IrBlock::new(TEXT_BASE + 0x100, 1, Expr::reg("rip"), JumpKind::Return))
        .with_block(IrBlock::new(TEXT_BASE + 0x200, 1, Expr::reg("rip"), JumpKind::Return));

    Program::new("jump-table")
        .with_segment(Segment::code(TEXT_BASE, vec![0x90; 0x300]))
        .with_segment(Segment::rodata(
            RODATA_BASE,
            words(&[TEXT_BASE + 0x100, TEXT_BASE + 0x200]),
        ))
        .with_function(dispatch)
}

/// Engine returning a fixed map and counting how often it ran.
#[derive(Default)]
pub struct FixedEngine {
    pub map: ReplacementMap,
    pub calls: AtomicUsize,
}

impl FixedEngine {
    pub fn new(map: ReplacementMap) -> Self {
        Self { map, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PropagationEngine for FixedEngine {
    fn propagate(
        &self,
        _program: &Program,
        _func: &Function,
        _options: &PropagatorOptions,
        _completed: &CompletedFunctions,
    ) -> Result<ReplacementMap, PropagationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.map.clone())
    }
}

/// Engine that always fails as if the function's IR were malformed.
pub struct FailingEngine;

impl PropagationEngine for FailingEngine {
    fn propagate(
        &self,
        _program: &Program,
        func: &Function,
        _options: &PropagatorOptions,
        _completed: &CompletedFunctions,
    ) -> Result<ReplacementMap, PropagationError> {
        Err(PropagationError::MissingEntry { func: func.addr })
    }
}
