//! Indirect jump resolvers and the chain that drives them.
//!
//! Every strategy implements [`IndirectJumpResolver`]. A [`ResolverChain`]
//! offers a jump site to its strategies in registration order; cheap,
//! timeless strategies go first and the whole-function constant resolver
//! goes last.

mod constant;
mod memory_load;
mod target;

pub use constant::ConstantResolver;
pub use memory_load::MemoryLoadResolver;
pub use target::{SegmentOracle, TargetValidity};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ResolverConfig, ResolverKind};
use crate::dataflow::{CompletedFunctions, PropagationCache, PropagationEngine, PropagationError};
use crate::model::{JumpSite, Program};

/// Outcome of one resolution attempt.
///
/// `targets` is empty whenever `resolved` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub resolved: bool,
    pub targets: Vec<u64>,
}

impl ResolutionResult {
    pub fn unresolved() -> Self {
        Self { resolved: false, targets: Vec::new() }
    }

    pub fn resolved(target: u64) -> Self {
        Self { resolved: true, targets: vec![target] }
    }
}

/// Collaborator failures surfaced while resolving.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("function {0:#x} is not part of the program")]
    UnknownFunction(u64),
    #[error(transparent)]
    Propagation(#[from] PropagationError),
}

/// What the CFG builder hands to a resolver for each attempt.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub program: &'a Program,
    pub completed: &'a CompletedFunctions,
    pub oracle: &'a dyn TargetValidity,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        program: &'a Program,
        completed: &'a CompletedFunctions,
        oracle: &'a dyn TargetValidity,
    ) -> Self {
        Self { program, completed, oracle }
    }
}

/// A pluggable indirect jump resolution strategy.
pub trait IndirectJumpResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether results depend only on the jump site itself and may be reused
    /// across CFG revisions.
    fn timeless(&self) -> bool;

    /// Cheap applicability check run before `resolve`.
    fn filter(&self, ctx: &ResolveContext<'_>, site: &JumpSite<'_>) -> bool;

    /// Attempt resolution. Failing to resolve is `Ok(unresolved)`, not an error.
    fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        site: &JumpSite<'_>,
    ) -> Result<ResolutionResult, ResolveError>;
}

/// Result of offering a jump site to a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Name of the resolver that succeeded, if any.
    pub resolver: Option<&'static str>,
    pub result: ResolutionResult,
}

/// Ordered list of resolvers tried until one succeeds.
///
/// Timeless results are remembered by jump address, so a chain serves one
/// program at a time. [`IndirectJumpDriver::run`] clears them before each
/// run; other callers switching programs must call
/// [`ResolverChain::clear_timeless_cache`].
///
/// [`IndirectJumpDriver::run`]: crate::services::recovery::IndirectJumpDriver::run
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn IndirectJumpResolver>>,
    timeless_results: Mutex<HashMap<u64, ChainOutcome>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver; it runs after every resolver registered before it.
    pub fn register<R: IndirectJumpResolver + 'static>(&mut self, resolver: R) -> &mut Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Resolver names in chain order.
    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    pub fn resolvers(&self) -> impl Iterator<Item = &dyn IndirectJumpResolver> {
        self.resolvers.iter().map(|r| &**r)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Offer `site` to each accepting resolver in order until one succeeds.
    pub fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        site: &JumpSite<'_>,
    ) -> Result<ChainOutcome, ResolveError> {
        if let Some(cached) = self.cached(site.addr) {
            log::trace!("reusing timeless resolution for jump at {:#x}", site.addr);
            return Ok(cached);
        }

        for resolver in &self.resolvers {
            if !resolver.filter(ctx, site) {
                continue;
            }
            let result = resolver.resolve(ctx, site)?;
            if result.resolved {
                log::debug!(
                    "{} resolved jump at {:#x} to {:x?}",
                    resolver.name(),
                    site.addr,
                    result.targets
                );
                let outcome = ChainOutcome { resolver: Some(resolver.name()), result };
                if resolver.timeless() {
                    self.remember(site.addr, outcome.clone());
                }
                return Ok(outcome);
            }
        }

        log::debug!("no resolver handled jump at {:#x}", site.addr);
        Ok(ChainOutcome { resolver: None, result: ResolutionResult::unresolved() })
    }

    /// Drop a remembered timeless result for the jump at `addr`.
    pub fn invalidate(&self, addr: u64) {
        self.timeless_results.lock().unwrap_or_else(|p| p.into_inner()).remove(&addr);
    }

    pub fn clear_timeless_cache(&self) {
        self.timeless_results.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn cached(&self, addr: u64) -> Option<ChainOutcome> {
        self.timeless_results.lock().unwrap_or_else(|p| p.into_inner()).get(&addr).cloned()
    }

    fn remember(&self, addr: u64, outcome: ChainOutcome) {
        self.timeless_results.lock().unwrap_or_else(|p| p.into_inner()).insert(addr, outcome);
    }
}

/// Build the chain described by `config`, backed by `engine`.
///
/// The configuration is expected to have passed [`ResolverConfig::validate`].
pub fn default_resolver_chain(
    config: &ResolverConfig,
    engine: Arc<dyn PropagationEngine>,
) -> ResolverChain {
    let mut chain = ResolverChain::new();
    for kind in &config.resolvers {
        match kind {
            ResolverKind::MemoryLoad => {
                chain.register(MemoryLoadResolver);
            }
            ResolverKind::Constant => {
                let mut resolver = ConstantResolver::new(Arc::clone(&engine));
                if config.cache_propagation {
                    resolver = resolver.with_cache(Arc::new(PropagationCache::new()));
                }
                chain.register(resolver);
            }
        }
    }
    chain
}
