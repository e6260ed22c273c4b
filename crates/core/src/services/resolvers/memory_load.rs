use super::{IndirectJumpResolver, ResolutionResult, ResolveContext, ResolveError};
use crate::model::{Expr, IrBlock, JumpSite, Stmt, Tmp};

/// Resolves `jmp [addr]` / `call [addr]` through a literal read-only slot.
///
/// Only looks at the block itself: the target temporary must be defined by a
/// load from a literal address (possibly through temporary copies), and the
/// slot must live in memory that cannot change at runtime, such as an import
/// table. The answer depends on the block alone, so the resolver is timeless.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryLoadResolver;

impl IndirectJumpResolver for MemoryLoadResolver {
    fn name(&self) -> &'static str {
        "memory_load"
    }

    fn timeless(&self) -> bool {
        true
    }

    fn filter(&self, _ctx: &ResolveContext<'_>, site: &JumpSite<'_>) -> bool {
        site.jump_kind.is_transfer()
    }

    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        site: &JumpSite<'_>,
    ) -> Result<ResolutionResult, ResolveError> {
        let depth = site.block.stmts.len();
        let Some(slot) = load_slot(site.block, &site.block.next, depth) else {
            return Ok(ResolutionResult::unresolved());
        };
        match ctx.program.read_only_word(slot) {
            Some(target) if ctx.oracle.is_valid_target(target) => {
                Ok(ResolutionResult::resolved(target))
            }
            _ => Ok(ResolutionResult::unresolved()),
        }
    }
}

/// Literal address loaded by `expr`, following temporaries defined in `block`.
///
/// `depth` bounds the number of temporaries followed.
fn load_slot(block: &IrBlock, expr: &Expr, depth: usize) -> Option<u64> {
    match expr {
        Expr::RdTmp(tmp) if depth > 0 => load_slot(block, definition(block, *tmp)?, depth - 1),
        Expr::Load(addr) => literal(block, addr, depth),
        _ => None,
    }
}

fn literal(block: &IrBlock, expr: &Expr, depth: usize) -> Option<u64> {
    match expr {
        Expr::Const(value) => Some(*value),
        Expr::RdTmp(tmp) if depth > 0 => literal(block, definition(block, *tmp)?, depth - 1),
        _ => None,
    }
}

fn definition(block: &IrBlock, tmp: Tmp) -> Option<&Expr> {
    block.stmts.iter().find_map(|stmt| match stmt {
        Stmt::WrTmp { tmp: t, expr } if *t == tmp => Some(expr),
        _ => None,
    })
}
