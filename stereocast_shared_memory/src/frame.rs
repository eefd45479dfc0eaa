//! Frame value types exchanged through a channel.

use crate::error::{ShmError, ShmResult};
use crate::layout::FrameShape;
use common::shm::consts::RGB_CHANNELS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes of one packed RGB image at this resolution.
    pub fn rgb_bytes(&self) -> usize {
        self.width as usize * self.height as usize * RGB_CHANNELS
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Packed 8-bit RGB image, row-major, `height * width * 3` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    /// Wrap existing pixel data. Fails if the length does not match the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> ShmResult<Self> {
        if width == 0 || height == 0 {
            return Err(ShmError::InvalidFrame {
                reason: format!("empty image {width}x{height}"),
            });
        }
        let expected = Resolution::new(width, height).rgb_bytes();
        if data.len() != expected {
            return Err(ShmError::InvalidFrame {
                reason: format!(
                    "{width}x{height} RGB image needs {expected} bytes, got {}",
                    data.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Black image of the given size.
    pub fn zeroed(resolution: Resolution) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            data: vec![0; resolution.rgb_bytes()],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Shape descriptor as stored in the `rgb_shape` segment.
    pub fn shape(&self) -> FrameShape {
        FrameShape::rgb(self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Pixel values scaled to `[0.0, 1.0]`, same row-major HWC layout.
    pub fn to_normalized_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| f32::from(v) / 255.0).collect()
    }

    /// Resize to `resolution`, keeping the allocation when possible.
    /// Contents are unspecified afterwards.
    pub(crate) fn reshape(&mut self, resolution: Resolution) {
        self.width = resolution.width;
        self.height = resolution.height;
        self.data.resize(resolution.rgb_bytes(), 0);
    }
}

impl fmt::Debug for RgbImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Left and right images from one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    pub left: RgbImage,
    pub right: RgbImage,
}

impl FramePair {
    /// Pair two images of identical size.
    pub fn new(left: RgbImage, right: RgbImage) -> ShmResult<Self> {
        if left.resolution() != right.resolution() {
            return Err(ShmError::InvalidFrame {
                reason: format!(
                    "left is {} but right is {}",
                    left.resolution(),
                    right.resolution()
                ),
            });
        }
        Ok(Self { left, right })
    }

    pub fn resolution(&self) -> Resolution {
        self.left.resolution()
    }

    /// Left and right images as normalized floats.
    pub fn normalized_pair(&self) -> (Vec<f32>, Vec<f32>) {
        (self.left.to_normalized_f32(), self.right.to_normalized_f32())
    }
}

/// 3x3 camera matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics(pub [f64; 9]);

impl Intrinsics {
    /// Pinhole matrix from focal lengths and principal point.
    pub const fn from_params(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self([fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0])
    }

    pub fn fx(&self) -> f64 {
        self.0[0]
    }

    pub fn fy(&self) -> f64 {
        self.0[4]
    }

    pub fn cx(&self) -> f64 {
        self.0[2]
    }

    pub fn cy(&self) -> f64 {
        self.0[5]
    }

    /// Matrix as rows.
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]]
    }
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self::from_params(1.0, 1.0, 0.0, 0.0)
    }
}

/// A receiver's private copy of one published frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub left: RgbImage,
    pub right: RgbImage,
    pub timestamp: f64,
    pub intrinsics: Intrinsics,
}

impl FrameSnapshot {
    /// Empty snapshot sized for `resolution`, for use with `Receiver::read_frame_into`.
    pub fn with_resolution(resolution: Resolution) -> Self {
        Self {
            left: RgbImage::zeroed(resolution),
            right: RgbImage::zeroed(resolution),
            timestamp: 0.0,
            intrinsics: Intrinsics::default(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.left.resolution()
    }
}
