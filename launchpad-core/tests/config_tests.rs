//! Config persistence, error-message, and atomic-write integration tests.
//! Storage: ~/.launchpad/config.yaml

use assert_fs::prelude::*;
use launchpad_core::{
    config::{self, LaunchConfig},
    paths, CommandSpec, ConfigError,
};
use predicates::prelude::predicate;
use std::fs;

// ---------------------------------------------------------------------------
// 1. Init and save
// ---------------------------------------------------------------------------

#[test]
fn init_writes_default_config_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::init_at(home.path(), false).expect("init");

    home.child(".launchpad/config.yaml")
        .assert(predicate::path::exists());
    home.child(".launchpad/config.yaml")
        .assert(predicate::str::contains("program: npm"));
    assert_eq!(path, paths::config_path(home.path()));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path(), false).expect("first init");

    let err = config::init_at(home.path(), false).unwrap_err();
    assert!(matches!(err, ConfigError::AlreadyExists { .. }), "got: {err}");
    config::init_at(home.path(), true).expect("forced init");
}

#[test]
fn save_then_load_preserves_custom_commands() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let custom = LaunchConfig {
        install: CommandSpec::new("yarn", ["install", "--frozen-lockfile"]),
        run: CommandSpec::new("yarn", ["start"]),
        convert_eol: false,
        boot_timeout_secs: Some(30),
        install_timeout_secs: Some(600),
        workspace_dir: Some(home.path().join("ws")),
    };
    config::save_at(home.path(), &custom).expect("save");

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded, custom);
}

#[test]
fn save_cleans_up_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &LaunchConfig::default()).expect("save");
    home.child(".launchpad/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn saved_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = config::save_at(home.path(), &LaunchConfig::default()).expect("save");
    let mode = fs::metadata(path).expect("metadata").permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

// ---------------------------------------------------------------------------
// 2. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".launchpad/config.yaml")
        .write_str("install: [unclosed\n  - : :")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "got: {err}");
}

#[test]
fn load_rejects_empty_program() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".launchpad/config.yaml")
        .write_str("run:\n  program: \"\"\n")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "run.program", .. }), "got: {err}");
}

#[test]
fn home_not_found_error_message() {
    assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
}
