//! Error types for shared memory channel operations

use thiserror::Error;

/// Errors reported by a camera driver during grab/retrieve.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The driver has no new frame yet; the capture may be retried.
    #[error("No frame ready")]
    NotReady,

    /// The device went away (unplugged, closed by another process).
    #[error("Camera disconnected: {0}")]
    Disconnected(String),

    /// Any other driver failure.
    #[error("Camera driver error: {0}")]
    Driver(String),
}

impl CaptureError {
    /// Whether the capture loop may try again instead of shutting down.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

/// Errors that can occur during shared memory operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// A segment of the channel does not exist (not created yet, or already destroyed)
    #[error("Channel not found: {namespace} (missing segment {segment})")]
    ChannelNotFound {
        /// Channel namespace
        namespace: String,
        /// Full shared memory name of the first missing segment
        segment: String,
    },

    /// Segment already exists
    #[error("Segment already exists: {name}")]
    AlreadyExists {
        /// Segment name
        name: String,
    },

    /// Namespace cannot be used to build segment names
    #[error("Invalid namespace '{namespace}': {reason}")]
    InvalidNamespace {
        /// Offending namespace
        namespace: String,
        /// Why it was rejected
        reason: String,
    },

    /// Frame does not match the channel layout (or is empty)
    #[error("Invalid frame: {reason}")]
    InvalidFrame {
        /// What is wrong with the frame
        reason: String,
    },

    /// A segment's size disagrees with the channel's shape descriptor
    #[error("Layout mismatch in segment {segment}: expected {expected} bytes, found {actual}")]
    LayoutMismatch {
        /// Segment name
        segment: String,
        /// Size implied by the shape descriptor
        expected: usize,
        /// Actual segment size
        actual: usize,
    },

    /// Permission denied
    #[error("Permission denied accessing segment: {name}")]
    PermissionDenied {
        /// Segment name
        name: String,
    },

    /// The camera failed; the publisher loop terminated
    #[error("Capture failure: {0}")]
    CaptureFailure(#[from] CaptureError),

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

impl ShmError {
    /// True for the error returned when attaching to a channel that does not exist.
    pub fn is_channel_not_found(&self) -> bool {
        matches!(self, Self::ChannelNotFound { .. })
    }
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
