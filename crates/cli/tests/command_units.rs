mod common;

use std::fs;
use std::path::Path;

use common::{jump_table_program, write_json, write_yaml};
use constjump::commands::{
    build_chain, list_resolvers_command, load_config, load_program, oracle_for, parse_address,
    propagate_command, resolve_command,
};
use constjump::{infer_program_name, sha256_file};
use constjump_core::config::ResolverConfig;
use constjump_core::services::resolvers::TargetValidity;
use tempfile::tempdir;

#[test]
fn parses_hex_and_decimal_addresses() {
    assert_eq!(parse_address("0x401000").unwrap(), 0x40_1000);
    assert_eq!(parse_address("0X10").unwrap(), 0x10);
    assert_eq!(parse_address(" 4096 ").unwrap(), 4096);
    assert!(parse_address("0xzz").is_err());
    assert!(parse_address("").is_err());
    let err = parse_address("main").unwrap_err();
    assert!(err.to_string().contains("Invalid address"));
}

#[test]
fn loads_json_and_yaml_programs_identically() {
    let dir = tempdir().expect("tempdir");
    let program = jump_table_program();
    let json = load_program(&write_json(dir.path(), "p.json", &program)).expect("json");
    let yaml = load_program(&write_yaml(dir.path(), "p.yml", &program)).expect("yaml");
    assert_eq!(json, program);
    assert_eq!(yaml, program);
}

#[test]
fn unnamed_programs_take_the_file_stem() {
    let dir = tempdir().expect("tempdir");
    let mut program = jump_table_program();
    program.name.clear();
    let loaded = load_program(&write_json(dir.path(), "firmware.json", &program)).expect("load");
    assert_eq!(loaded.name, "firmware");
}

#[test]
fn malformed_yaml_program_reports_context() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "functions: 12\n").expect("write");
    let err = load_program(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse program YAML"));
}

#[test]
fn missing_config_path_means_defaults() {
    assert_eq!(load_config(None).expect("defaults"), ResolverConfig::default());
    let err = load_config(Some("/nonexistent/resolvers.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read resolver config"));
}

#[test]
fn oracle_applies_config_alignment_and_denials() {
    let program = jump_table_program();
    let config = ResolverConfig {
        target_alignment: Some(0x100),
        deny_targets: [0x40_1100].into(),
        ..ResolverConfig::default()
    };
    let oracle = oracle_for(&program, &config);
    assert!(oracle.is_valid_target(0x40_1200));
    assert!(!oracle.is_valid_target(0x40_1100));
    assert!(!oracle.is_valid_target(0x40_1010));
}

#[test]
fn chain_is_built_from_config() {
    assert_eq!(build_chain(&ResolverConfig::default()).names(), vec!["memory_load", "constant"]);
}

#[test]
fn commands_run_against_fixture() {
    let dir = tempdir().expect("tempdir");
    let path = write_json(dir.path(), "dispatch.json", &jump_table_program());
    let path = path.to_str().expect("utf-8 path");

    resolve_command(path, None, false).expect("resolve text");
    resolve_command(path, None, true).expect("resolve json");
    propagate_command(path, "0x401000", None, false).expect("propagate");
    list_resolvers_command(None, true).expect("resolvers");
    assert!(propagate_command(path, "0x1", None, false).is_err());
}

#[test]
fn infer_program_name_uses_file_stem() {
    assert_eq!(infer_program_name(Path::new("/tmp/fixtures/router.yaml")), "router");
    assert_eq!(infer_program_name(Path::new("/")), "unnamed-program");
}

#[test]
fn sha256_file_hashes_contents() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("empty.bin");
    fs::write(&path, b"").expect("write");
    assert_eq!(
        sha256_file(&path).expect("hash"),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(sha256_file(&dir.path().join("missing.bin")).is_err());
}
