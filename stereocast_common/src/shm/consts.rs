//! SHM (Shared Memory) constants.
//!
//! These constants define the fixed parameters of a stereocast channel.
//! They are the single source of truth - all other crates should import from here.

use std::time::Duration;

/// Segment suffix of the left pixel buffer.
pub const RGB_LEFT_FIELD: &str = "rgb_left";
/// Segment suffix of the right pixel buffer.
pub const RGB_RIGHT_FIELD: &str = "rgb_right";
/// Segment suffix of the `(height, width, channels)` shape descriptor.
pub const RGB_SHAPE_FIELD: &str = "rgb_shape";
/// Segment suffix of the frame timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Segment suffix of the 3x3 intrinsics matrix.
pub const INTRINSICS_FIELD: &str = "intrinsics";
/// Segment suffix of the frame-rate scalar.
pub const FPS_FIELD: &str = "fps";
/// Segment suffix of the write flag.
pub const WRITE_LOCK_FIELD: &str = "write_lock";
/// Segment suffix of the reader count.
pub const READ_LOCK_FIELD: &str = "read_lock";

/// Number of segments backing one channel.
pub const CHANNEL_SEGMENT_COUNT: usize = 8;

/// Colour channels per pixel (packed RGB, one byte each).
pub const RGB_CHANNELS: usize = 3;

/// Maximum length of a POSIX shared memory name without the leading `/`.
///
/// Matches `NAME_MAX` on Linux, which bounds file names under `/dev/shm`.
pub const SHM_NAME_MAX: usize = 255;

/// Directory where Linux exposes POSIX shared memory objects.
pub const SHM_DIR: &str = "/dev/shm";

/// Sleep between checks of the write flag / reader count.
pub const LOCK_SPIN_INTERVAL: Duration = Duration::from_micros(10);

/// Sleep between checks for a fresh frame timestamp.
pub const FRAME_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Sleep before retrying a capture that reported "no frame ready yet".
pub const CAPTURE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Publisher loop iterations between debug statistics log lines.
pub const STATS_LOG_INTERVAL: u64 = 600;
