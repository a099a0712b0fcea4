//! Tests for configuration resolution and atomic write-back
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate HMAP_CONFIG are marked with #[serial].

use hmap_common::config::{
    load_toml_config, read_toml_config, resolve_config_path, write_toml_config, ArbiterSection,
    LoggingConfig, MatchingSection, ThresholdsSection, TomlConfig, WeightsSection, CONFIG_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> TomlConfig {
    TomlConfig {
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: Some(PathBuf::from("/tmp/hmap.log")),
        },
        matching: MatchingSection {
            geo_radius_m: Some(3000.0),
            weights: Some(WeightsSection {
                name: 0.25,
                address: 0.15,
                geo: 0.30,
                postal: 0.30,
            }),
            thresholds: Some(ThresholdsSection {
                auto_match: 0.9,
                auto_reject: 0.3,
            }),
        },
        arbiter: ArbiterSection {
            enabled: Some(true),
            model: Some("gpt-4o-mini".to_string()),
            timeout_ms: Some(15_000),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn test_write_then_read_preserves_fields() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("hmap.toml");

    let config = sample_config();
    write_toml_config(&config, &target).unwrap();

    let loaded = read_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("hmap.toml");

    write_toml_config(&sample_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("hmap.toml.tmp").exists());
}

#[test]
fn test_write_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("dir").join("hmap.toml");

    write_toml_config(&TomlConfig::default(), &target).unwrap();
    assert!(target.exists());
}

#[cfg(unix)]
#[test]
fn test_written_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("hmap.toml");
    write_toml_config(&sample_config(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_unparsable_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("broken.toml");
    std::fs::write(&target, "[matching\nweights = ").unwrap();

    assert!(read_toml_config(&target).is_err());
}

#[test]
#[serial]
fn test_cli_path_wins_over_env() {
    let temp_dir = TempDir::new().unwrap();
    let cli_path = temp_dir.path().join("cli.toml");
    env::set_var(CONFIG_ENV_VAR, "/tmp/hmap-env.toml");

    let resolved = resolve_config_path(Some(&cli_path));

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(cli_path));
}

#[test]
#[serial]
fn test_env_path_used_without_cli_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/hmap-env.toml");

    let resolved = resolve_config_path(None);

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/hmap-env.toml")));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist.toml");

    let err = load_toml_config(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
#[serial]
fn test_load_explicit_file() {
    env::remove_var(CONFIG_ENV_VAR);
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("hmap.toml");
    std::fs::write(
        &target,
        r#"
        [matching]
        geo_radius_m = 2500.0

        [runner]
        max_candidates = 2
        "#,
    )
    .unwrap();

    let config = load_toml_config(Some(&target)).unwrap();
    assert_eq!(config.matching.geo_radius_m, Some(2500.0));
    assert_eq!(config.runner.max_candidates, Some(2));
    assert!(config.matching.weights.is_none());
    assert_eq!(config.logging.level, "info");
}
