//! Unit tests for configuration resolution and graceful degradation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate MPI_* variables are marked with #[serial].

use mpi_common::config::{
    resolve_config_path, CommitMode, LinkerConfig, CENTRAL_ORG_ENV_VAR, CONFIG_ENV_VAR,
    THRESHOLD_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(THRESHOLD_ENV_VAR);
    env::remove_var(CENTRAL_ORG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_takes_precedence_over_env() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/mpi-from-env.toml");

    let cli = PathBuf::from("/tmp/mpi-from-cli.toml");
    let resolved = resolve_config_path(Some(&cli));
    assert_eq!(resolved, Some(cli));

    clear_env();
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/mpi-from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/mpi-from-env.toml")));

    clear_env();
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config = LinkerConfig::load(Some(&missing)).unwrap();
    assert_eq!(config, LinkerConfig::default());
}

#[test]
#[serial]
fn test_load_reads_file_and_applies_env_overrides() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[linker]
similarity_threshold = 0.8
search_limit = 50
commit_mode = "transaction"
central_organization = "Organization/from-file"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = LinkerConfig::load(Some(&path)).unwrap();
    assert_eq!(config.linker.similarity_threshold, 0.8);
    assert_eq!(config.linker.search_limit, 50);
    assert_eq!(config.linker.commit_mode, CommitMode::Transaction);
    assert_eq!(config.logging.level, "debug");

    env::set_var(THRESHOLD_ENV_VAR, "0.97");
    env::set_var(CENTRAL_ORG_ENV_VAR, "Organization/from-env");
    let config = LinkerConfig::load(Some(&path)).unwrap();
    assert_eq!(config.linker.similarity_threshold, 0.97);
    assert_eq!(config.linker.central_organization, "Organization/from-env");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_threshold_is_config_error() {
    clear_env();
    env::set_var(THRESHOLD_ENV_VAR, "very-similar");

    let result = LinkerConfig::load(Some(&PathBuf::from("/nonexistent/mpi.toml")));
    assert!(result.is_err());

    env::set_var(THRESHOLD_ENV_VAR, "2.0");
    let result = LinkerConfig::load(Some(&PathBuf::from("/nonexistent/mpi.toml")));
    assert!(result.is_err(), "out-of-range threshold must fail validation");

    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_is_reported() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[linker\nsimilarity_threshold = ").unwrap();

    assert!(LinkerConfig::load(Some(&path)).is_err());
}
