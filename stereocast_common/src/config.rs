//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all stereocast applications.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stereocast_common::config::{ConfigError, StereocastConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = StereocastConfig::load_validated(Path::new("stereocast.toml"))?;
//!     println!("Publishing to: {}", config.publisher.namespace);
//!     Ok(())
//! }
//! ```

use crate::shm::consts::{
    CAPTURE_RETRY_INTERVAL, FRAME_POLL_INTERVAL, LOCK_SPIN_INTERVAL, SHM_NAME_MAX,
};
use crate::shm::policy::AdmissionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all stereocast applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "stereocast-cam-31733653"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[publisher]` section: where and how frames are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherSettings {
    /// Channel namespace, e.g. the camera serial number.
    pub namespace: String,
    /// Write admission policy of the frame lock.
    pub admission: AdmissionPolicy,
    /// Sleep between frame lock checks, in microseconds.
    pub lock_spin_interval_us: u64,
    /// Sleep before retrying a capture that was not ready, in microseconds.
    pub capture_retry_interval_us: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            namespace: "camera".to_string(),
            admission: AdmissionPolicy::default(),
            lock_spin_interval_us: LOCK_SPIN_INTERVAL.as_micros() as u64,
            capture_retry_interval_us: CAPTURE_RETRY_INTERVAL.as_micros() as u64,
        }
    }
}

impl PublisherSettings {
    /// Lock spin interval as a `Duration`.
    pub fn lock_spin_interval(&self) -> Duration {
        Duration::from_micros(self.lock_spin_interval_us)
    }

    /// Capture retry interval as a `Duration`.
    pub fn capture_retry_interval(&self) -> Duration {
        Duration::from_micros(self.capture_retry_interval_us)
    }

    /// Validate the namespace against POSIX shared memory naming rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_namespace(&self.namespace)
    }
}

/// `[camera]` section: parameters of the built-in synthetic source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Capture rate in frames per second.
    pub fps: f64,
    /// Sleep between captures so frames arrive at `fps`.
    pub pace: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60.0,
            pace: true,
        }
    }
}

impl CameraSettings {
    /// Validate resolution and frame rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "camera resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "camera fps must be positive, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}

/// `[receiver]` section: polling behaviour of receivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverSettings {
    /// Sleep between checks for a fresh timestamp, in microseconds.
    pub poll_interval_us: u64,
    /// Sleep between frame lock checks, in microseconds.
    pub lock_spin_interval_us: u64,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            poll_interval_us: FRAME_POLL_INTERVAL.as_micros() as u64,
            lock_spin_interval_us: LOCK_SPIN_INTERVAL.as_micros() as u64,
        }
    }
}

impl ReceiverSettings {
    /// Frame poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Lock spin interval as a `Duration`.
    pub fn lock_spin_interval(&self) -> Duration {
        Duration::from_micros(self.lock_spin_interval_us)
    }
}

/// Complete configuration file of a stereocast process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "stereocast-left-rig"
///
/// [publisher]
/// namespace = "31733653"
/// admission = "exclusive"
///
/// [camera]
/// width = 1280
/// height = 720
/// fps = 60.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StereocastConfig {
    /// Logging and instance name.
    pub shared: SharedConfig,
    /// Publisher settings.
    #[serde(default)]
    pub publisher: PublisherSettings,
    /// Synthetic camera settings.
    #[serde(default)]
    pub camera: CameraSettings,
    /// Receiver settings.
    #[serde(default)]
    pub receiver: ReceiverSettings,
}

impl StereocastConfig {
    /// Configuration with defaults for everything but the service name.
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::default(),
                service_name: service_name.into(),
            },
            publisher: PublisherSettings::default(),
            camera: CameraSettings::default(),
            receiver: ReceiverSettings::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.publisher.validate()?;
        self.camera.validate()
    }

    /// Load from a TOML file and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Check that `namespace` can prefix the POSIX shared memory names of a channel.
///
/// The longest segment name is `{namespace}_write_lock`, which must fit in
/// [`SHM_NAME_MAX`] bytes.
pub fn validate_namespace(namespace: &str) -> Result<(), ConfigError> {
    const LONGEST_SUFFIX: usize = "_write_lock".len();

    if namespace.is_empty() {
        return Err(ConfigError::ValidationError(
            "namespace cannot be empty".to_string(),
        ));
    }
    if namespace.contains('/') || namespace.contains('\0') {
        return Err(ConfigError::ValidationError(format!(
            "namespace '{}' must not contain '/' or NUL",
            namespace.escape_default()
        )));
    }
    if namespace.len() + LONGEST_SUFFIX > SHM_NAME_MAX {
        return Err(ConfigError::ValidationError(format!(
            "namespace is {} bytes, at most {} allowed",
            namespace.len(),
            SHM_NAME_MAX - LONGEST_SUFFIX
        )));
    }
    Ok(())
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, expected) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed: TestWrapper = toml::from_str(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, expected);
            assert_eq!(expected.as_directive(), text);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_namespace_validation() {
        assert!(validate_namespace("31733653").is_ok());
        assert!(validate_namespace("left_cam").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a/b").is_err());
        assert!(validate_namespace("nul\0byte").is_err());

        let longest = "x".repeat(SHM_NAME_MAX - "_write_lock".len());
        assert!(validate_namespace(&longest).is_ok());
        let too_long = format!("{longest}x");
        assert!(validate_namespace(&too_long).is_err());
    }

    #[test]
    fn test_camera_validation() {
        let mut camera = CameraSettings::default();
        assert!(camera.validate().is_ok());

        camera.fps = 0.0;
        assert!(camera.validate().is_err());

        camera.fps = 30.0;
        camera.width = 0;
        assert!(camera.validate().is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = StereocastConfig::load(Path::new("/nonexistent/path/stereocast.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = StereocastConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
service_name = "test-service"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = StereocastConfig::load_validated(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.publisher.namespace, "camera");
        assert_eq!(config.publisher.admission, AdmissionPolicy::Exclusive);
        assert_eq!(config.publisher.lock_spin_interval(), LOCK_SPIN_INTERVAL);
        assert_eq!(config.receiver.poll_interval(), FRAME_POLL_INTERVAL);
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.camera.height, 720);
    }

    #[test]
    fn test_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "rig"

[publisher]
namespace = "31733653"
admission = "legacy"
lock_spin_interval_us = 20

[camera]
width = 640
height = 480
fps = 30.0
pace = false

[receiver]
poll_interval_us = 250
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = StereocastConfig::load_validated(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.publisher.namespace, "31733653");
        assert_eq!(config.publisher.admission, AdmissionPolicy::Legacy);
        assert_eq!(config.publisher.lock_spin_interval(), Duration::from_micros(20));
        assert_eq!(config.camera.width, 640);
        assert!(!config.camera.pace);
        assert_eq!(config.receiver.poll_interval(), Duration::from_micros(250));
        assert_eq!(config.receiver.lock_spin_interval(), LOCK_SPIN_INTERVAL);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
service_name = "rig"

[publisher]
namespcae = "typo"
"#
        )
        .unwrap();
        file.flush().unwrap();

        assert!(matches!(
            StereocastConfig::load(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_namespace_rejected_on_validate() {
        let mut config = StereocastConfig::with_service_name("rig");
        config.publisher.namespace = "bad/name".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
