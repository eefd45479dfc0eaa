//! # Stereocast Shared Memory Channels
//!
//! Single-producer, multi-consumer distribution of stereo camera frames over
//! POSIX shared memory. One publisher process owns the camera and writes each
//! left/right RGB pair into a named channel; any number of receiver processes
//! attach to the channel by name, wait for a fresh frame and copy it out.
//!
//! ## Channel Layout
//!
//! A channel is eight shared memory objects sharing a namespace prefix:
//!
//! ```text
//! /{ns}_rgb_left     H*W*3 u8      left pixels, row-major
//! /{ns}_rgb_right    H*W*3 u8      right pixels, row-major
//! /{ns}_rgb_shape    3 x i64       (H, W, 3)
//! /{ns}_timestamp    f64           seconds since the epoch, strictly increasing
//! /{ns}_intrinsics   9 x f64       3x3 camera matrix, row-major
//! /{ns}_fps          f64           nominal frame rate
//! /{ns}_write_lock   bool          a write is in progress
//! /{ns}_read_lock    isize         receivers currently copying
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Publisher     │    │    Channel      │    │   Receiver 1    │
//! │                 │    │                 │    │                 │
//! │ StereoCamera    ├───►│ pixels + meta   ├───►│ read_frame()    │
//! │ write_frame()   │    │ write flag      │    │                 │
//! └─────────────────┘    │ reader count    │    └─────────────────┘
//!                        └────────┬────────┘    ┌─────────────────┐
//!                                 └────────────►│   Receiver N    │
//!                                               └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stereocast_shared_memory::{Publisher, PublisherConfig, Receiver, SyntheticCamera};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = SyntheticCamera::new(1280, 720, 60.0).with_pacing(true);
//! let publisher = Publisher::spawn(camera, PublisherConfig::new("zed0"))?;
//! publisher.wait_ready(Duration::from_secs(1));
//!
//! let mut receiver = Receiver::attach("zed0")?;
//! let timestamp = receiver.wait_for_next_frame();
//! let frame = receiver.read_frame()?;
//! println!("{} at {timestamp}", frame.resolution());
//!
//! publisher.stop();
//! publisher.join()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust,no_run
//! use stereocast_shared_memory::{Receiver, ShmError};
//!
//! match Receiver::attach("missing_channel") {
//!     Ok(receiver) => { /* use receiver */ }
//!     Err(ShmError::ChannelNotFound { namespace, segment }) => {
//!         eprintln!("Channel '{}' not found ({}) - is the publisher running?", namespace, segment);
//!     }
//!     Err(e) => eprintln!("Unexpected error: {}", e),
//! }
//! ```
//!
//! ## Caveats
//!
//! - A publisher killed without unwinding leaves its segments behind; remove
//!   them with [`ChannelDiscovery::remove_stale`].
//! - Waits have no timeout. A receiver killed mid-copy leaves the reader
//!   count raised and stalls the writer under [`AdmissionPolicy::Exclusive`].
//! - The timestamp and the pixel buffers are not read as one atomic unit.

#![warn(clippy::all)]

pub mod camera;
pub mod channel;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod layout;
pub mod lock;
pub mod platform;
pub mod publisher;
pub mod receiver;
pub mod segment;

pub use camera::{CaptureStatus, Side, StereoCamera, SyntheticCamera, capture_pair};
pub use channel::{Channel, ChannelHandle, next_timestamp, now_seconds};
pub use common::shm::policy::AdmissionPolicy;
pub use discovery::{ChannelDiscovery, ChannelInfo};
pub use error::{CaptureError, ShmError, ShmResult};
pub use frame::{FramePair, FrameSnapshot, Intrinsics, Resolution, RgbImage};
pub use layout::{ChannelField, FrameShape, LayoutSummary};
pub use lock::{FrameLock, ReadGuard, WriteGuard};
pub use publisher::{Publisher, PublisherConfig, PublisherHandle, PublisherStats};
pub use receiver::{Receiver, ReceiverConfig};
pub use segment::SharedSegment;

/// Filter used by [`init_tracing`] when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "stereocast_shared_memory=info";

/// Install a fmt subscriber for programs embedding a publisher or receiver.
///
/// Publisher threads are named `publisher-{namespace}`, so thread names are
/// printed. Output goes through `print!`, so the test harness captures it.
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}
