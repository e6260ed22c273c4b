use std::path::Path;

use anyhow::{Context, Result};
use constjump_core::services::recovery::{IndirectJumpDriver, JumpStatus, RecoveryReport};

use crate::commands::{build_chain, load_config, load_program, oracle_for};
use crate::sha256_file;

/// Run the configured resolver chain over every indirect jump of a program.
pub fn resolve_command(program_path: &str, config_path: Option<&str>, json: bool) -> Result<()> {
    let path = Path::new(program_path);
    let config = load_config(config_path)?;
    let mut program = load_program(path)?;

    let chain = build_chain(&config);
    let driver = IndirectJumpDriver::new(&chain);
    let report = driver.run(&mut program, |p| oracle_for(p, &config));
    log::info!(
        "resolved {} of {} indirect jumps in '{}'",
        report.resolved_count(),
        report.jumps.len(),
        report.program
    );

    if json {
        let serialized = serde_json::to_string_pretty(&report)
            .context("Failed to serialize recovery report to JSON")?;
        println!("{}", serialized);
    } else {
        print_report(&report, &sha256_file(path)?);
    }

    Ok(())
}

fn print_report(report: &RecoveryReport, hash: &str) {
    println!("Program: {}", report.program);
    println!("  SHA-256: {}", hash);
    println!("  Generated: {}", report.generated_at);
    println!(
        "Indirect jumps ({}): {} resolved, {} unresolved",
        report.jumps.len(),
        report.resolved_count(),
        report.unresolved_count()
    );
    if report.jumps.is_empty() {
        println!("  (none)");
        return;
    }

    for jump in &report.jumps {
        let kind = format!("{:?}", jump.jump_kind);
        match &jump.status {
            JumpStatus::Resolved { resolver, targets } => {
                let targets: Vec<String> = targets.iter().map(|t| format!("{:#x}", t)).collect();
                println!(
                    "  - {:#x} [{}] in {:#x}: resolved by {} -> {}",
                    jump.addr,
                    kind,
                    jump.func_addr,
                    resolver,
                    targets.join(", ")
                );
            }
            JumpStatus::Unresolved => {
                println!("  - {:#x} [{}] in {:#x}: unresolved", jump.addr, kind, jump.func_addr);
            }
            JumpStatus::Failed { reason } => {
                println!(
                    "  - {:#x} [{}] in {:#x}: failed ({})",
                    jump.addr, kind, jump.func_addr, reason
                );
            }
        }
    }
}
