use serde::{Deserialize, Serialize};

/// An IR temporary slot, scoped to a single block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tmp(pub u32);

/// Classification of a block's terminating control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpKind {
    /// Ordinary (boring) control transfer.
    Jump,
    /// Call; control resumes at the fall-through address.
    Call,
    Return,
    /// Guarded side exit leaving the block early.
    ConditionalExit,
    Syscall,
    /// The lifter could not decode the next instruction.
    NoDecode,
}

impl JumpKind {
    /// Kinds whose destination is worth resolving to a concrete address.
    pub fn is_transfer(self) -> bool {
        matches!(self, JumpKind::Jump | JumpKind::Call)
    }
}

/// Binary operations understood by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    /// Apply the operation with wrapping semantics, truncated to `bits`.
    pub fn apply(self, lhs: u64, rhs: u64, bits: u32) -> u64 {
        let raw = match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
            BinOp::Shl => shift_amount(rhs, bits).map_or(0, |s| lhs << s),
            BinOp::Shr => shift_amount(rhs, bits).map_or(0, |s| mask(lhs, bits) >> s),
        };
        mask(raw, bits)
    }
}

fn shift_amount(rhs: u64, bits: u32) -> Option<u32> {
    u32::try_from(rhs).ok().filter(|s| *s < bits.min(64))
}

/// Truncate `value` to the low `bits` bits.
pub(crate) fn mask(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// IR expressions. Expressions are side-effect free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(u64),
    RdTmp(Tmp),
    /// Read a guest register by name.
    Get(String),
    /// Read one machine word from memory.
    Load(Box<Expr>),
    BinOp { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    pub fn tmp(n: u32) -> Self {
        Expr::RdTmp(Tmp(n))
    }

    pub fn reg(name: impl Into<String>) -> Self {
        Expr::Get(name.into())
    }

    pub fn load(addr: Expr) -> Self {
        Expr::Load(Box::new(addr))
    }

    pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    /// Returns the literal value if this expression is a constant.
    pub fn as_const(&self) -> Option<u64> {
        match self {
            Expr::Const(value) => Some(*value),
            _ => None,
        }
    }
}

/// IR statements making up a block body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// Marks the start of a guest instruction.
    IMark { addr: u64, len: u32 },
    WrTmp { tmp: Tmp, expr: Expr },
    Put { reg: String, expr: Expr },
    Store { addr: Expr, value: Expr },
    /// Conditional side exit to a literal target.
    Exit { guard: Expr, target: u64 },
}

/// A lifted basic block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrBlock {
    pub addr: u64,
    /// Size in bytes of the guest code covered by this block.
    pub size: u32,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    /// Jump target expression evaluated when the block falls off its end.
    pub next: Expr,
    pub jump_kind: JumpKind,
}

impl IrBlock {
    pub fn new(addr: u64, size: u32, next: Expr, jump_kind: JumpKind) -> Self {
        Self { addr, size, stmts: Vec::new(), next, jump_kind }
    }

    pub fn with_stmts(mut self, stmts: Vec<Stmt>) -> Self {
        self.stmts = stmts;
        self
    }

    /// Address of the instruction that performs the final transfer.
    pub fn last_instruction_addr(&self) -> u64 {
        self.stmts
            .iter()
            .rev()
            .find_map(|stmt| match stmt {
                Stmt::IMark { addr, .. } => Some(*addr),
                _ => None,
            })
            .unwrap_or(self.addr)
    }

    /// Address immediately after the block.
    pub fn fallthrough_addr(&self) -> u64 {
        self.addr.wrapping_add(u64::from(self.size))
    }

    /// Literal successor addresses named by the block itself.
    pub fn static_targets(&self) -> Vec<u64> {
        let mut targets: Vec<u64> = self
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Exit { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        match self.jump_kind {
            JumpKind::Jump | JumpKind::ConditionalExit => {
                if let Some(target) = self.next.as_const() {
                    targets.push(target);
                }
            }
            JumpKind::Call | JumpKind::Syscall => targets.push(self.fallthrough_addr()),
            JumpKind::Return | JumpKind::NoDecode => {}
        }
        targets
    }
}
