use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use constjump_core::config::{load_resolver_config, ResolverConfig};
use constjump_core::dataflow::ConstPropagator;
use constjump_core::model::Program;
use constjump_core::services::resolvers::{default_resolver_chain, ResolverChain, SegmentOracle};

use crate::infer_program_name;

/// Load a lifted program from JSON or YAML (chosen by file extension).
pub fn load_program(path: &Path) -> Result<Program> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read program file {}", path.display()))?;
    let mut program: Program = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&body).context("Failed to parse program JSON")?,
        _ => serde_yaml::from_str(&body).context("Failed to parse program YAML")?,
    };
    if program.name.is_empty() {
        program.name = infer_program_name(path);
    }
    log::debug!(
        "loaded program '{}' ({} functions, {} segments)",
        program.name,
        program.functions.len(),
        program.segments.len()
    );
    Ok(program)
}

/// Load the resolver config at `path`, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> Result<ResolverConfig> {
    match path {
        Some(path) => load_resolver_config(Path::new(path)),
        None => Ok(ResolverConfig::default()),
    }
}

/// Parse an address given as `0x`-prefixed hex or decimal.
pub fn parse_address(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| anyhow!("Invalid address '{}': expected 0x-prefixed hex or decimal", text))
}

/// Propagation engine configured from `config`.
pub fn engine_for(config: &ResolverConfig) -> ConstPropagator {
    ConstPropagator::new().with_max_block_visits(config.max_block_visits)
}

/// Build the resolver chain described by `config`.
pub fn build_chain(config: &ResolverConfig) -> ResolverChain {
    default_resolver_chain(config, Arc::new(engine_for(config)))
}

/// Target oracle for the program's current state, honoring config overrides.
pub fn oracle_for(program: &Program, config: &ResolverConfig) -> SegmentOracle {
    let oracle = SegmentOracle::new(program).with_denied(config.deny_targets.iter().copied());
    match config.target_alignment {
        Some(alignment) => oracle.with_alignment(alignment),
        None => oracle,
    }
}
