#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use constjump_core::model::{BinOp, Expr, Function, IrBlock, JumpKind, Program, Segment, Stmt, Tmp};

/// Dispatch through a rodata table: `mov rax, 0x402000; jmp [rax + 8]`.
pub fn jump_table_program() -> Program {
    let table: Vec<u8> =
        [0x40_1100u64, 0x40_1200].iter().flat_map(|v| v.to_le_bytes()).collect();
    let dispatch = Function::new(0x40_1000)
        .with_name("dispatch")
        .with_block(
            IrBlock::new(0x40_1000, 0x10, Expr::Const(0x40_1010), JumpKind::Jump).with_stmts(vec![
                Stmt::IMark { addr: 0x40_1000, len: 7 },
                Stmt::Put { reg: "rax".into(), expr: Expr::Const(0x40_2000) },
            ]),
        )
        .with_block(IrBlock::new(0x40_1010, 4, Expr::tmp(2), JumpKind::Jump).with_stmts(vec![
            Stmt::IMark { addr: 0x40_1010, len: 4 },
            Stmt::WrTmp { tmp: Tmp(0), expr: Expr::reg("rax") },
            Stmt::WrTmp { tmp: Tmp(1), expr: Expr::binop(BinOp::Add, Expr::tmp(0), Expr::Const(8)) },
            Stmt::WrTmp { tmp: Tmp(2), expr: Expr::load(Expr::tmp(1)) },
        ]))
        .with_block(IrBlock::new(0x40_1100, 1, Expr::reg("rip"), JumpKind::Return))
        .with_block(IrBlock::new(0x40_1200, 1, Expr::reg("rip"), JumpKind::Return));

    Program::new("jump-table")
        .with_segment(Segment::code(0x40_1000, vec![0x90; 0x300]))
        .with_segment(Segment::rodata(0x40_2000, table))
        .with_function(dispatch)
}

pub fn write_json(dir: &Path, name: &str, program: &Program) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(program).expect("serialize program"))
        .expect("write program");
    path
}

pub fn write_yaml(dir: &Path, name: &str, program: &Program) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_yaml::to_string(program).expect("serialize program"))
        .expect("write program");
    path
}
