use std::io::Write;

use constjump_core::config::{load_resolver_config, ConfigError, ResolverConfig, ResolverKind};

#[test]
fn defaults_place_constant_last() {
    let config = ResolverConfig::default();
    assert_eq!(config.resolvers, vec![ResolverKind::MemoryLoad, ResolverKind::Constant]);
    assert!(config.cache_propagation);
    assert!(config.validate().is_ok());
}

#[test]
fn validation_rejects_bad_chains() {
    let empty = ResolverConfig { resolvers: vec![], ..ResolverConfig::default() };
    assert_eq!(empty.validate(), Err(ConfigError::EmptyChain));

    let dup = ResolverConfig {
        resolvers: vec![ResolverKind::MemoryLoad, ResolverKind::MemoryLoad],
        ..ResolverConfig::default()
    };
    assert_eq!(dup.validate(), Err(ConfigError::DuplicateResolver("memory_load")));

    let misplaced = ResolverConfig {
        resolvers: vec![ResolverKind::Constant, ResolverKind::MemoryLoad],
        ..ResolverConfig::default()
    };
    assert_eq!(misplaced.validate(), Err(ConfigError::ConstantNotLast));

    let zero = ResolverConfig { max_block_visits: 0, ..ResolverConfig::default() };
    assert_eq!(zero.validate(), Err(ConfigError::ZeroBlockVisits));
}

#[test]
fn loads_yaml_with_defaults_for_missing_fields() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "resolvers: [constant]\ntarget_alignment: 4\ndeny_targets: [4198400]").unwrap();

    let config = load_resolver_config(file.path()).unwrap();
    assert_eq!(config.resolvers, vec![ResolverKind::Constant]);
    assert_eq!(config.target_alignment, Some(4));
    assert!(config.deny_targets.contains(&0x40_1000));
    assert!(config.cache_propagation);
}

#[test]
fn loads_json_by_extension() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"cache_propagation": false, "max_block_visits": 16}}"#).unwrap();

    let config = load_resolver_config(file.path()).unwrap();
    assert!(!config.cache_propagation);
    assert_eq!(config.max_block_visits, 16);
    assert_eq!(config.resolvers, ResolverConfig::default().resolvers);
}

#[test]
fn invalid_files_carry_context() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "resolvers: [constant, memory_load]").unwrap();
    let err = load_resolver_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid resolver config"));

    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "resolvers: [telepathy]").unwrap();
    let err = load_resolver_config(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse resolver config YAML"));

    let err = load_resolver_config(std::path::Path::new("/nonexistent/constjump.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read resolver config"));
}
