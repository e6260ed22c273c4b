use std::sync::Arc;

use super::{IndirectJumpResolver, ResolutionResult, ResolveContext, ResolveError};
use crate::dataflow::{
    AbstractValue, CodeLocation, PropagationCache, PropagationEngine, PropagatorOptions,
    ReplacementMap, Variable,
};
use crate::model::{Expr, JumpSite};

/// Resolves an indirect jump by propagating constants over the whole
/// enclosing function and checking whether the jump target folds to a single
/// valid address.
///
/// Results depend on everything known about the function so far, so this
/// resolver is not timeless and belongs at the end of the chain, after every
/// cheaper pattern-based resolver.
pub struct ConstantResolver {
    engine: Arc<dyn PropagationEngine>,
    options: PropagatorOptions,
    cache: Option<Arc<PropagationCache>>,
}

impl ConstantResolver {
    pub fn new(engine: Arc<dyn PropagationEngine>) -> Self {
        Self { engine, options: PropagatorOptions::constants_only(), cache: None }
    }

    /// Memoize propagation per function; entries are dropped when the
    /// function's code or resolved edges change, or when a callee summary is
    /// removed from the registry.
    pub fn with_cache(mut self, cache: Arc<PropagationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &PropagatorOptions {
        &self.options
    }

    fn replacements(
        &self,
        ctx: &ResolveContext<'_>,
        func_addr: u64,
    ) -> Result<Arc<ReplacementMap>, ResolveError> {
        let func =
            ctx.program.function(func_addr).ok_or(ResolveError::UnknownFunction(func_addr))?;
        let compute = || self.engine.propagate(ctx.program, func, &self.options, ctx.completed);
        let replacements = match &self.cache {
            Some(cache) => cache.get_or_compute(func, ctx.completed, compute)?,
            None => Arc::new(compute()?),
        };
        Ok(replacements)
    }
}

impl IndirectJumpResolver for ConstantResolver {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn timeless(&self) -> bool {
        false
    }

    fn filter(&self, _ctx: &ResolveContext<'_>, site: &JumpSite<'_>) -> bool {
        site.jump_kind.is_transfer()
    }

    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        site: &JumpSite<'_>,
    ) -> Result<ResolutionResult, ResolveError> {
        if !site.jump_kind.is_transfer() {
            log::debug!(
                "constant resolver offered {:?} jump at {:#x}; ignoring",
                site.jump_kind,
                site.addr
            );
            return Ok(ResolutionResult::unresolved());
        }

        // Only temporaries are keyed in the replacement map.
        let Expr::RdTmp(tmp) = &site.block.next else {
            log::trace!("jump at {:#x}: target is not a temporary", site.addr);
            return Ok(ResolutionResult::unresolved());
        };

        let replacements = self.replacements(ctx, site.func_addr)?;
        if replacements.is_empty() {
            log::trace!("jump at {:#x}: propagation produced nothing", site.addr);
            return Ok(ResolutionResult::unresolved());
        }

        let loc = CodeLocation::block(site.block.addr);
        let var = Variable::Tmp(*tmp);
        let Some(value) = replacements.get(&loc, &var) else {
            log::trace!("jump at {:#x}: no value for {} at {}", site.addr, var, loc);
            return Ok(ResolutionResult::unresolved());
        };

        let target = match value {
            AbstractValue::Const { value, .. } => *value,
            AbstractValue::Symbolic(_) | AbstractValue::Compound { .. } => {
                log::trace!("jump at {:#x}: {} is not constant ({})", site.addr, var, value);
                return Ok(ResolutionResult::unresolved());
            }
        };

        if !ctx.oracle.is_valid_target(target) {
            log::debug!("jump at {:#x}: constant target {:#x} rejected", site.addr, target);
            return Ok(ResolutionResult::unresolved());
        }

        Ok(ResolutionResult::resolved(target))
    }
}
