use std::path::Path;

use anyhow::{anyhow, Context, Result};
use constjump_core::dataflow::{
    CompletedFunctions, PropagationEngine, PropagatorOptions, ReplacementMap,
};
use serde::Serialize;

use crate::commands::{engine_for, load_config, load_program, parse_address};

/// Replacement map of one function as emitted by `propagate --json`.
#[derive(Debug, Serialize)]
pub struct PropagationDump {
    pub function: u64,
    pub options: PropagatorOptions,
    pub replacements: ReplacementMap,
}

/// Print the replacement map the constant resolver queries for a function.
pub fn propagate_command(
    program_path: &str,
    function: &str,
    config_path: Option<&str>,
    json: bool,
) -> Result<()> {
    let func_addr = parse_address(function)?;
    let config = load_config(config_path)?;
    let program = load_program(Path::new(program_path))?;
    let func = program
        .function(func_addr)
        .ok_or_else(|| anyhow!("Function {:#x} not found in program '{}'", func_addr, program.name))?;

    let options = PropagatorOptions::constants_only();
    let replacements = engine_for(&config)
        .propagate(&program, func, &options, &CompletedFunctions::new())
        .with_context(|| format!("Failed to propagate constants through {:#x}", func_addr))?;

    if json {
        let dump = PropagationDump { function: func_addr, options, replacements };
        let serialized = serde_json::to_string_pretty(&dump)
            .context("Failed to serialize replacements to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    let name = func.name.as_deref().unwrap_or("-");
    println!("Function {:#x} ({})", func_addr, name);
    let entries = replacements.sorted_entries();
    println!("Replacements ({}):", entries.len());
    if entries.is_empty() {
        println!("  (none)");
    }
    for (location, variable, value) in entries {
        println!("  {}  {} = {}", location, variable, value);
    }

    Ok(())
}
