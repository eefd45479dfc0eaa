//! Synthetic stereo camera.
//!
//! Produces a deterministic pattern so that any published frame can be
//! reconstructed from its index and compared byte for byte. Each image starts
//! with its frame index (8 bytes, little endian); every row is filled with a
//! value derived from the row, the frame index and the side.

use super::StereoCamera;
use crate::error::CaptureError;
use crate::frame::{FramePair, Intrinsics, Resolution, RgbImage};
use std::time::{Duration, Instant};
use tracing::debug;

const INDEX_BYTES: usize = size_of::<u64>();

/// Which image of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    const fn offset(self) -> u64 {
        match self {
            Self::Left => 0,
            Self::Right => 128,
        }
    }
}

/// Camera that renders frames instead of reading a device.
#[derive(Debug)]
pub struct SyntheticCamera {
    resolution: Resolution,
    fps: f64,
    intrinsics: Intrinsics,
    pace: bool,
    fail_after: Option<u64>,
    not_ready_every: Option<u64>,
    next_index: u64,
    current: Option<u64>,
    grab_attempts: u64,
    next_deadline: Option<Instant>,
}

impl SyntheticCamera {
    /// Unpaced camera with a centred pinhole matrix.
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let focal = f64::from(width) * 0.75;
        Self {
            resolution: Resolution::new(width, height),
            fps,
            intrinsics: Intrinsics::from_params(
                focal,
                focal,
                f64::from(width) / 2.0,
                f64::from(height) / 2.0,
            ),
            pace: false,
            fail_after: None,
            not_ready_every: None,
            next_index: 0,
            current: None,
            grab_attempts: 0,
            next_deadline: None,
        }
    }

    /// Sleep in `grab_frame` so frames arrive at the nominal rate.
    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_intrinsics(mut self, intrinsics: Intrinsics) -> Self {
        self.intrinsics = intrinsics;
        self
    }

    /// Fail with a driver error once `frames` pairs have been grabbed.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Report `NotReady` on every `n`-th grab attempt.
    pub fn with_not_ready_every(mut self, n: u64) -> Self {
        self.not_ready_every = (n > 0).then_some(n);
        self
    }

    /// Number of pairs grabbed so far.
    pub fn frames_grabbed(&self) -> u64 {
        self.next_index
    }

    /// Render one image of frame `frame_index`.
    pub fn render(resolution: Resolution, frame_index: u64, side: Side) -> RgbImage {
        let mut image = RgbImage::zeroed(resolution);
        let row_bytes = resolution.rgb_bytes() / resolution.height.max(1) as usize;
        let seed = frame_index.wrapping_mul(7).wrapping_add(side.offset());
        if row_bytes > 0 {
            for (row, chunk) in image.as_bytes_mut().chunks_exact_mut(row_bytes).enumerate() {
                chunk.fill((row as u64).wrapping_mul(3).wrapping_add(seed) as u8);
            }
        }
        let bytes = image.as_bytes_mut();
        let stamp = frame_index.to_le_bytes();
        let n = bytes.len().min(INDEX_BYTES);
        bytes[..n].copy_from_slice(&stamp[..n]);
        image
    }

    /// The pair this camera produces as frame `frame_index`.
    pub fn expected_pair(&self, frame_index: u64) -> FramePair {
        FramePair {
            left: Self::render(self.resolution, frame_index, Side::Left),
            right: Self::render(self.resolution, frame_index, Side::Right),
        }
    }

    /// Frame index stamped into a rendered image, if it is large enough to carry one.
    pub fn frame_index_of(image: &RgbImage) -> Option<u64> {
        let head = image.as_bytes().get(..INDEX_BYTES)?;
        Some(u64::from_le_bytes(head.try_into().ok()?))
    }

    fn frame_period(&self) -> Option<Duration> {
        (self.fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.fps))
    }

    fn wait_for_deadline(&mut self) {
        let Some(period) = self.frame_period() else {
            return;
        };
        let now = Instant::now();
        let deadline = *self.next_deadline.get_or_insert(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Fell behind by more than a frame: restart the schedule.
        let next = deadline + period;
        self.next_deadline = Some(if next < Instant::now() {
            Instant::now() + period
        } else {
            next
        });
    }

    fn current_index(&self) -> Result<u64, CaptureError> {
        self.current.ok_or(CaptureError::NotReady)
    }
}

impl StereoCamera for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn grab_frame(&mut self) -> Result<(), CaptureError> {
        self.grab_attempts += 1;
        if let Some(limit) = self.fail_after {
            if self.next_index >= limit {
                return Err(CaptureError::Driver(format!(
                    "synthetic failure after {limit} frames"
                )));
            }
        }
        if let Some(n) = self.not_ready_every {
            if self.grab_attempts % n == 0 {
                return Err(CaptureError::NotReady);
            }
        }
        if self.pace {
            self.wait_for_deadline();
        }

        self.current = Some(self.next_index);
        self.next_index += 1;
        if self.next_index % 600 == 0 {
            debug!("Synthetic camera at frame {}", self.next_index);
        }
        Ok(())
    }

    fn retrieve_left(&mut self) -> Result<RgbImage, CaptureError> {
        let index = self.current_index()?;
        Ok(Self::render(self.resolution, index, Side::Left))
    }

    fn retrieve_right(&mut self) -> Result<RgbImage, CaptureError> {
        let index = self.current_index()?;
        Ok(Self::render(self.resolution, index, Side::Right))
    }

    fn intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}
