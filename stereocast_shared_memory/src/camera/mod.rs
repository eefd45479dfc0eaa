//! Stereo camera interface consumed by the publisher.
//!
//! A camera driver exposes the grab/retrieve sequence of a stereo device.
//! The publisher never calls the driver directly; it goes through
//! [`capture_pair`], which folds the three calls into one [`CaptureStatus`].
//!
//! - [`synthetic`] - deterministic generator for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `camera/`
//! 2. Implement [`StereoCamera`] for the device handle
//! 3. Report "no frame yet" as [`CaptureError::NotReady`]; anything else ends publishing

pub mod synthetic;

pub use synthetic::{Side, SyntheticCamera};

use crate::error::CaptureError;
use crate::frame::{FramePair, Intrinsics, Resolution, RgbImage};

/// Stereo camera driver.
///
/// Implementations are moved into the publisher thread, hence `Send`.
pub trait StereoCamera: Send {
    /// Driver identifier used in log messages (e.g. "synthetic", "zed").
    fn name(&self) -> &'static str;

    /// Trigger acquisition of the next stereo pair.
    ///
    /// Blocks until the device has a frame, or returns
    /// [`CaptureError::NotReady`] if it has none yet.
    fn grab_frame(&mut self) -> Result<(), CaptureError>;

    /// Left image of the last grabbed pair.
    fn retrieve_left(&mut self) -> Result<RgbImage, CaptureError>;

    /// Right image of the last grabbed pair.
    fn retrieve_right(&mut self) -> Result<RgbImage, CaptureError>;

    /// Left camera matrix.
    fn intrinsics(&self) -> Intrinsics;

    /// Nominal frame rate in frames per second.
    fn frame_rate(&self) -> f64;

    /// Nominal image size.
    fn resolution(&self) -> Resolution;
}

impl<C: StereoCamera + ?Sized> StereoCamera for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn grab_frame(&mut self) -> Result<(), CaptureError> {
        (**self).grab_frame()
    }

    fn retrieve_left(&mut self) -> Result<RgbImage, CaptureError> {
        (**self).retrieve_left()
    }

    fn retrieve_right(&mut self) -> Result<RgbImage, CaptureError> {
        (**self).retrieve_right()
    }

    fn intrinsics(&self) -> Intrinsics {
        (**self).intrinsics()
    }

    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }
}

/// Outcome of one capture attempt.
#[derive(Debug)]
pub enum CaptureStatus {
    /// A complete pair.
    Captured(FramePair),
    /// No frame yet; try again.
    NotReady,
    /// The camera failed; publishing must stop.
    Failed(CaptureError),
}

impl From<CaptureError> for CaptureStatus {
    fn from(error: CaptureError) -> Self {
        if error.is_retryable() {
            Self::NotReady
        } else {
            Self::Failed(error)
        }
    }
}

/// Grab and retrieve one stereo pair.
pub fn capture_pair<C: StereoCamera + ?Sized>(camera: &mut C) -> CaptureStatus {
    let pair = camera.grab_frame().and_then(|()| {
        let left = camera.retrieve_left()?;
        let right = camera.retrieve_right()?;
        Ok((left, right))
    });

    match pair {
        Ok((left, right)) => match FramePair::new(left, right) {
            Ok(pair) => CaptureStatus::Captured(pair),
            Err(e) => CaptureStatus::Failed(CaptureError::Driver(e.to_string())),
        },
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed script of grab results.
    struct ScriptedCamera {
        script: Vec<Result<(), CaptureError>>,
        right_resolution: Resolution,
    }

    impl StereoCamera for ScriptedCamera {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn grab_frame(&mut self) -> Result<(), CaptureError> {
            if self.script.is_empty() {
                Ok(())
            } else {
                self.script.remove(0)
            }
        }

        fn retrieve_left(&mut self) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::zeroed(Resolution::new(4, 2)))
        }

        fn retrieve_right(&mut self) -> Result<RgbImage, CaptureError> {
            Ok(RgbImage::zeroed(self.right_resolution))
        }

        fn intrinsics(&self) -> Intrinsics {
            Intrinsics::default()
        }

        fn frame_rate(&self) -> f64 {
            30.0
        }

        fn resolution(&self) -> Resolution {
            Resolution::new(4, 2)
        }
    }

    #[test]
    fn test_capture_statuses() {
        let mut camera = ScriptedCamera {
            script: vec![
                Err(CaptureError::NotReady),
                Err(CaptureError::Disconnected("unplugged".into())),
            ],
            right_resolution: Resolution::new(4, 2),
        };
        assert!(matches!(capture_pair(&mut camera), CaptureStatus::NotReady));
        assert!(matches!(
            capture_pair(&mut camera),
            CaptureStatus::Failed(CaptureError::Disconnected(_))
        ));
        assert!(matches!(capture_pair(&mut camera), CaptureStatus::Captured(_)));
    }

    #[test]
    fn test_mismatched_pair_is_fatal() {
        let mut camera = ScriptedCamera {
            script: Vec::new(),
            right_resolution: Resolution::new(2, 2),
        };
        assert!(matches!(
            capture_pair(&mut camera),
            CaptureStatus::Failed(CaptureError::Driver(_))
        ));
    }

    #[test]
    fn test_boxed_camera() {
        let mut camera: Box<dyn StereoCamera> = Box::new(ScriptedCamera {
            script: Vec::new(),
            right_resolution: Resolution::new(4, 2),
        });
        assert_eq!(camera.name(), "scripted");
        assert!(matches!(capture_pair(&mut camera), CaptureStatus::Captured(_)));
    }
}
