use std::io::Write;

use carton_core::config::{dirs_path, GlobalConfig};
use carton_util::errors::CartonError;
use tempfile::NamedTempFile;

#[test]
fn test_default_prefers_resolved() {
    let config = GlobalConfig::default();
    assert!(config.resolver.prefer_resolved);
    assert!(config.resolver.max_nodes.is_none());
}

#[test]
fn test_empty_toml_uses_serde_defaults() {
    let config = GlobalConfig::parse_toml("").unwrap();
    assert!(config.resolver.prefer_resolved);
    assert!(config.resolver.max_nodes.is_none());
}

#[test]
fn test_parse_resolver_section() {
    let toml = r#"
[resolver]
prefer-resolved = false
max-nodes = 5000
"#;
    let config = GlobalConfig::parse_toml(toml).unwrap();
    assert!(!config.resolver.prefer_resolved);
    assert_eq!(config.resolver.max_nodes, Some(5000));
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = GlobalConfig::parse_toml("[resolver\nmax-nodes = ").unwrap_err();
    assert!(matches!(err, CartonError::Config { .. }), "got: {err}");
}

#[test]
fn test_from_path_reads_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[resolver]\nmax-nodes = 12").unwrap();
    let config = GlobalConfig::from_path(file.path()).unwrap();
    assert_eq!(config.resolver.max_nodes, Some(12));
}

#[test]
fn test_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = GlobalConfig::from_path(&dir.path().join("missing.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read"), "got: {err}");
}

#[test]
fn test_default_path_is_config_toml() {
    assert!(GlobalConfig::default_path().ends_with("config.toml"));
    assert!(GlobalConfig::default_path().starts_with(dirs_path()));
}
