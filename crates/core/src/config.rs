use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataflow::DEFAULT_MAX_BLOCK_VISITS;

/// Resolver strategies that can be placed in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    /// Timeless `jmp [literal]` resolution through read-only memory.
    MemoryLoad,
    /// Whole-function constant propagation.
    Constant,
}

impl ResolverKind {
    pub fn name(self) -> &'static str {
        match self {
            ResolverKind::MemoryLoad => "memory_load",
            ResolverKind::Constant => "constant",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("resolver chain is empty")]
    EmptyChain,
    #[error("resolver '{0}' appears more than once")]
    DuplicateResolver(&'static str),
    #[error("the constant resolver must be the last resolver in the chain")]
    ConstantNotLast,
    #[error("max_block_visits must be greater than zero")]
    ZeroBlockVisits,
}

/// Serializable configuration for a resolution run.
///
/// Every field has a default, so an empty document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Resolver order; the constant resolver, if present, must come last.
    pub resolvers: Vec<ResolverKind>,
    /// Memoize propagation per function between jump sites.
    pub cache_propagation: bool,
    /// Minimum alignment required of resolved targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_alignment: Option<u64>,
    /// Bound on block visits for a single propagation run.
    pub max_block_visits: usize,
    /// Addresses never accepted as targets.
    pub deny_targets: BTreeSet<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolvers: vec![ResolverKind::MemoryLoad, ResolverKind::Constant],
            cache_propagation: true,
            target_alignment: None,
            max_block_visits: DEFAULT_MAX_BLOCK_VISITS,
            deny_targets: BTreeSet::new(),
        }
    }
}

impl ResolverConfig {
    /// Check chain ordering and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolvers.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        let mut seen = BTreeSet::new();
        for kind in &self.resolvers {
            if !seen.insert(*kind) {
                return Err(ConfigError::DuplicateResolver(kind.name()));
            }
        }
        if let Some(pos) = self.resolvers.iter().position(|k| *k == ResolverKind::Constant) {
            if pos + 1 != self.resolvers.len() {
                return Err(ConfigError::ConstantNotLast);
            }
        }
        if self.max_block_visits == 0 {
            return Err(ConfigError::ZeroBlockVisits);
        }
        Ok(())
    }
}

/// Load a resolver config from JSON or YAML (chosen by file extension) and validate it.
pub fn load_resolver_config(path: &Path) -> Result<ResolverConfig> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read resolver config at {}", path.display()))?;
    let config: ResolverConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&bytes).context("Failed to parse resolver config JSON")?
    } else {
        serde_yaml::from_slice(&bytes).context("Failed to parse resolver config YAML")?
    };
    config.validate().context("Invalid resolver config")?;
    Ok(config)
}
