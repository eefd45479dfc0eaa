//! Channel layout: segment naming and binary sizes.
//!
//! A channel named `ns` consists of eight POSIX shared memory objects
//! `/ns_rgb_left`, `/ns_rgb_right`, `/ns_rgb_shape`, `/ns_timestamp`,
//! `/ns_intrinsics`, `/ns_fps`, `/ns_write_lock` and `/ns_read_lock`.
//! All values use native endianness.

use crate::error::{ShmError, ShmResult};
use common::config::validate_namespace as check_namespace;
use common::shm::consts::{
    FPS_FIELD, INTRINSICS_FIELD, READ_LOCK_FIELD, RGB_CHANNELS, RGB_LEFT_FIELD, RGB_RIGHT_FIELD,
    RGB_SHAPE_FIELD, TIMESTAMP_FIELD, WRITE_LOCK_FIELD,
};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::fmt;

/// One of the eight segments of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelField {
    RgbLeft,
    RgbRight,
    RgbShape,
    Timestamp,
    Intrinsics,
    Fps,
    WriteLock,
    ReadLock,
}

impl ChannelField {
    /// Every field, in creation order. The shape descriptor comes last so that
    /// a visible, initialised shape implies the rest of the channel exists.
    pub const ALL: [ChannelField; 8] = [
        Self::RgbLeft,
        Self::RgbRight,
        Self::Timestamp,
        Self::Intrinsics,
        Self::Fps,
        Self::WriteLock,
        Self::ReadLock,
        Self::RgbShape,
    ];

    /// Segment name suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::RgbLeft => RGB_LEFT_FIELD,
            Self::RgbRight => RGB_RIGHT_FIELD,
            Self::RgbShape => RGB_SHAPE_FIELD,
            Self::Timestamp => TIMESTAMP_FIELD,
            Self::Intrinsics => INTRINSICS_FIELD,
            Self::Fps => FPS_FIELD,
            Self::WriteLock => WRITE_LOCK_FIELD,
            Self::ReadLock => READ_LOCK_FIELD,
        }
    }

    /// POSIX shared memory name of this field for `namespace`.
    pub fn segment_name(self, namespace: &str) -> String {
        format!("/{}_{}", namespace, self.suffix())
    }

    /// Size of the segment when it does not depend on the frame shape.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::RgbLeft | Self::RgbRight => None,
            Self::RgbShape => Some(size_of::<FrameShape>()),
            Self::Timestamp | Self::Fps => Some(size_of::<f64>()),
            Self::Intrinsics => Some(9 * size_of::<f64>()),
            Self::WriteLock => Some(size_of::<bool>()),
            Self::ReadLock => Some(size_of::<isize>()),
        }
    }

    /// Size of the segment for a channel of the given shape.
    pub fn size_for(self, shape: &FrameShape) -> ShmResult<usize> {
        match self.fixed_size() {
            Some(size) => Ok(size),
            None => shape.pixel_bytes(),
        }
    }

    /// Split a `/dev/shm` entry name (`{namespace}_{field}`, no leading `/`)
    /// into namespace and field.
    pub fn parse_segment_file(file_name: &str) -> Option<(&str, ChannelField)> {
        Self::ALL.iter().find_map(|&field| {
            let namespace = file_name
                .strip_suffix(field.suffix())?
                .strip_suffix('_')?;
            (!namespace.is_empty()).then_some((namespace, field))
        })
    }
}

impl fmt::Display for ChannelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Contents of the `rgb_shape` segment: `(height, width, channels)` as i64.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: i64,
    pub width: i64,
    pub channels: i64,
}

const_assert_eq!(size_of::<FrameShape>(), 24);

// SAFETY: three i64 fields, repr(C), no padding.
unsafe impl crate::segment::PlainData for FrameShape {}

impl FrameShape {
    /// Shape of a packed RGB frame.
    pub const fn rgb(width: u32, height: u32) -> Self {
        Self {
            height: height as i64,
            width: width as i64,
            channels: RGB_CHANNELS as i64,
        }
    }

    /// Byte size of one pixel buffer, validating the descriptor.
    pub fn pixel_bytes(&self) -> ShmResult<usize> {
        if self.height <= 0 || self.width <= 0 {
            return Err(ShmError::InvalidFrame {
                reason: format!("non-positive dimensions {}x{}", self.width, self.height),
            });
        }
        if self.channels != RGB_CHANNELS as i64 {
            return Err(ShmError::InvalidFrame {
                reason: format!("expected {} channels, got {}", RGB_CHANNELS, self.channels),
            });
        }
        (self.height as usize)
            .checked_mul(self.width as usize)
            .and_then(|pixels| pixels.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| ShmError::InvalidFrame {
                reason: format!("frame {}x{} is too large", self.width, self.height),
            })
    }

    /// Dimensions as a [`Resolution`](crate::frame::Resolution).
    pub fn resolution(&self) -> crate::frame::Resolution {
        crate::frame::Resolution {
            width: self.width.clamp(0, u32::MAX as i64) as u32,
            height: self.height.clamp(0, u32::MAX as i64) as u32,
        }
    }
}

/// Validate a namespace for use in segment names.
pub fn validate_namespace(namespace: &str) -> ShmResult<()> {
    check_namespace(namespace).map_err(|e| ShmError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: e.to_string(),
    })
}

/// Summary of a channel's layout, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub width: u32,
    pub height: u32,
    pub pixel_bytes: usize,
    pub total_bytes: usize,
}

impl LayoutSummary {
    pub fn for_shape(shape: &FrameShape) -> ShmResult<Self> {
        let pixel_bytes = shape.pixel_bytes()?;
        let total_bytes = ChannelField::ALL
            .iter()
            .map(|field| field.size_for(shape))
            .sum::<ShmResult<usize>>()?;
        let resolution = shape.resolution();
        Ok(Self {
            width: resolution.width,
            height: resolution.height,
            pixel_bytes,
            total_bytes,
        })
    }
}
