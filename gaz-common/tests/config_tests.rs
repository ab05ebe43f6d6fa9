//! Unit tests for configuration and graceful degradation
//!
//! Covers:
//! - Missing TOML files do not abort startup
//! - Priority order for root folder resolution
//! - Automatic directory creation
//! - Partial TOML files fill the rest with defaults
//!
//! Tests that manipulate GAZ_ROOT_FOLDER or GAZ_ROOT are marked #[serial]
//! so they never race on the process environment.

use gaz_common::config::{
    load_toml_config, write_toml_config, CompiledDefaults, IndexConfig, ReviewSettings,
    RootFolderInitializer, RootFolderResolver, TomlConfig, DATABASE_FILE_NAME,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_root_env() {
    env::remove_var("GAZ_ROOT_FOLDER");
    env::remove_var("GAZ_ROOT");
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
    assert!(defaults.root_folder.to_string_lossy().contains("gaz"));
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    env::set_var("GAZ_ROOT_FOLDER", "/tmp/gaz-from-env");

    let resolver = RootFolderResolver::new("gaz-review")
        .with_cli_arg(Some(PathBuf::from("/tmp/gaz-from-cli")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/gaz-from-cli"));

    clear_root_env();
}

#[test]
#[serial]
fn test_primary_env_var_wins_over_fallback() {
    env::set_var("GAZ_ROOT_FOLDER", "/tmp/gaz-primary");
    env::set_var("GAZ_ROOT", "/tmp/gaz-fallback");

    let resolved = RootFolderResolver::new("gaz-review").resolve();
    assert_eq!(resolved, PathBuf::from("/tmp/gaz-primary"));

    clear_root_env();
}

#[test]
#[serial]
fn test_fallback_env_var_used_when_primary_missing() {
    clear_root_env();
    env::set_var("GAZ_ROOT", "/tmp/gaz-fallback");

    let resolved = RootFolderResolver::new("gaz-review").resolve();
    assert_eq!(resolved, PathBuf::from("/tmp/gaz-fallback"));

    clear_root_env();
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    clear_root_env();
    env::set_var("GAZ_ROOT_FOLDER", "   ");

    let resolved = RootFolderResolver::new("gaz-test-module-without-config").resolve();
    assert_ne!(resolved, PathBuf::from("   "));

    clear_root_env();
}

#[test]
fn test_initializer_creates_directory_and_locates_database() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();
    // Second call is a no-op
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join(DATABASE_FILE_NAME));
    assert!(!initializer.database_exists());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("gaz-review.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/gaz"

[index]
url = "http://localhost:9200"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/gaz")));
    assert_eq!(config.index.url.as_deref(), Some("http://localhost:9200"));
    assert_eq!(config.index.name, IndexConfig::default().name);
    assert_eq!(config.review, ReviewSettings::default());
    assert_eq!(config.review.bulk_chunk_size, 300);
    assert_eq!(config.review.canonical_authority, "whg");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, gaz_common::Error::Config(_)), "got {:?}", err);
}

#[test]
fn test_write_then_load_preserves_review_settings() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("cfg").join("gaz-review.toml");

    let mut config = TomlConfig::default();
    config.review.bulk_chunk_size = 50;
    config.review.canonical_authority = "gaz".to_string();
    config.index.timeout_ms = 2500;

    write_toml_config(&config, &path).unwrap();
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}
