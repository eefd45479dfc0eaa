//! Prelude module for common re-exports.
//!
//! ```rust
//! use stereocast_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    CameraSettings, ConfigError, ConfigLoader, PublisherSettings, ReceiverSettings,
    SharedConfig, StereocastConfig,
};

// ─── Shared Memory ──────────────────────────────────────────────────
pub use crate::shm::consts::{
    CHANNEL_SEGMENT_COUNT, FRAME_POLL_INTERVAL, LOCK_SPIN_INTERVAL, RGB_CHANNELS,
};
pub use crate::shm::policy::AdmissionPolicy;
