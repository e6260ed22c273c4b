use anyhow::{Context, Result};
use serde::Serialize;

use crate::commands::{build_chain, load_config};

/// One entry of the configured resolver chain.
#[derive(Debug, Serialize)]
pub struct ResolverInfo {
    pub position: usize,
    pub name: &'static str,
    pub timeless: bool,
}

/// List the resolver chain in the order jumps are offered to it.
pub fn list_resolvers_command(config_path: Option<&str>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let chain = build_chain(&config);
    let resolvers: Vec<ResolverInfo> = chain
        .resolvers()
        .enumerate()
        .map(|(i, r)| ResolverInfo { position: i + 1, name: r.name(), timeless: r.timeless() })
        .collect();

    if json {
        let serialized = serde_json::to_string_pretty(&resolvers)
            .context("Failed to serialize resolvers to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Resolvers ({}):", resolvers.len());
    for info in &resolvers {
        let flavor = if info.timeless { "timeless" } else { "per-revision" };
        println!("  {}. {} [{}]", info.position, info.name, flavor);
    }
    println!(
        "Propagation cache: {}",
        if config.cache_propagation { "enabled" } else { "disabled" }
    );
    println!("Max block visits: {}", config.max_block_visits);

    Ok(())
}
