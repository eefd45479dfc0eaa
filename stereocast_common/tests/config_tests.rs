//! Tests for the shipped example configuration and CLI-style overrides.

use stereocast_common::config::{ConfigError, ConfigLoader, StereocastConfig};
use stereocast_common::shm::policy::AdmissionPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn example_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("config")
        .join("stereocast.toml")
}

#[test]
fn example_config_is_valid() {
    let config = StereocastConfig::load_validated(&example_config_path())
        .expect("shipped example config must load");

    assert_eq!(config.shared.service_name, "stereocast-synthetic");
    assert_eq!(config.publisher.namespace, "synthetic0");
    assert_eq!(config.publisher.admission, AdmissionPolicy::Exclusive);
    assert_eq!((config.camera.width, config.camera.height), (1280, 720));
    assert_eq!(config.camera.fps, 60.0);
}

#[test]
fn missing_service_name_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereocast.toml");
    fs::write(&path, "[publisher]\nnamespace = \"cam\"\n").unwrap();

    assert!(matches!(
        StereocastConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn negative_fps_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stereocast.toml");
    fs::write(
        &path,
        "[shared]\nservice_name = \"rig\"\n\n[camera]\nfps = -5.0\n",
    )
    .unwrap();

    assert!(matches!(
        StereocastConfig::load_validated(&path),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn overrides_after_load_are_revalidated() {
    let mut config = StereocastConfig::load_validated(&example_config_path()).unwrap();
    config.publisher.namespace = String::new();
    assert!(config.validate().is_err());

    config.publisher.namespace = "31733653".to_string();
    config.camera.fps = 15.0;
    assert!(config.validate().is_ok());
}
