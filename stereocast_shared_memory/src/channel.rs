//! Channel lifecycle: creation, attachment and teardown of the segment set.
//!
//! The publisher owns a [`Channel`]; it is the only side that creates and
//! unlinks segments. Receivers hold a [`ChannelHandle`], which maps the same
//! segments and unmaps them on drop without unlinking anything.

use crate::error::{ShmError, ShmResult};
use crate::frame::{FramePair, Intrinsics, Resolution, RgbImage};
use crate::layout::{ChannelField, FrameShape, validate_namespace};
use crate::lock::{FrameLock, WriteGuard};
use crate::segment::SharedSegment;
use common::shm::consts::CHANNEL_SEGMENT_COUNT;
use common::shm::policy::AdmissionPolicy;
use nix::errno::Errno;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Wall clock in seconds since the UNIX epoch.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Timestamp to publish after `previous`, given the current clock reading.
///
/// Always strictly greater than `previous`: if the clock has not advanced
/// the next representable `f64` above `previous` is used.
pub fn next_timestamp(previous: f64, now: f64) -> f64 {
    if now > previous {
        now
    } else {
        next_up(previous)
    }
}

fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// The eight mapped segments of one channel.
#[derive(Debug)]
struct ChannelSegments {
    namespace: String,
    shape: FrameShape,
    rgb_left: SharedSegment,
    rgb_right: SharedSegment,
    rgb_shape: SharedSegment,
    timestamp: SharedSegment,
    intrinsics: SharedSegment,
    fps: SharedSegment,
    write_lock: SharedSegment,
    read_lock: SharedSegment,
}

impl ChannelSegments {
    fn create(
        namespace: &str,
        shape: FrameShape,
        created: &mut Vec<String>,
    ) -> ShmResult<Self> {
        let mut make = |field: ChannelField| -> ShmResult<SharedSegment> {
            let segment = SharedSegment::create(&field.segment_name(namespace), field.size_for(&shape)?)?;
            created.push(segment.name().to_string());
            Ok(segment)
        };

        // Same order as `ChannelField::ALL`: shape last.
        let rgb_left = make(ChannelField::RgbLeft)?;
        let rgb_right = make(ChannelField::RgbRight)?;
        let timestamp = make(ChannelField::Timestamp)?;
        let intrinsics = make(ChannelField::Intrinsics)?;
        let fps = make(ChannelField::Fps)?;
        let write_lock = make(ChannelField::WriteLock)?;
        let read_lock = make(ChannelField::ReadLock)?;
        let rgb_shape = make(ChannelField::RgbShape)?;

        Ok(Self {
            namespace: namespace.to_string(),
            shape,
            rgb_left,
            rgb_right,
            rgb_shape,
            timestamp,
            intrinsics,
            fps,
            write_lock,
            read_lock,
        })
    }

    fn open(namespace: &str) -> ShmResult<Self> {
        let open = |field: ChannelField| -> ShmResult<SharedSegment> {
            SharedSegment::open(&field.segment_name(namespace)).map_err(|e| match e {
                ShmError::Nix {
                    source: Errno::ENOENT,
                } => not_found(namespace, field),
                other => other,
            })
        };

        // Phase one: the shape descriptor decides every other size.
        let rgb_shape = open(ChannelField::RgbShape)?;
        if rgb_shape.len() < size_of::<FrameShape>() {
            return Err(not_found(namespace, ChannelField::RgbShape));
        }
        // The height word is stored last with release ordering; zero means
        // created but not initialised yet.
        if rgb_shape.as_atomic_i64().load(Ordering::Acquire) == 0 {
            return Err(not_found(namespace, ChannelField::RgbShape));
        }
        let shape: FrameShape = rgb_shape.read_value();
        let pixel_bytes = shape.pixel_bytes()?;

        // Phase two: everything else, checked against the shape.
        let rgb_left = open(ChannelField::RgbLeft)?;
        rgb_left.require_exact_len(pixel_bytes)?;
        let rgb_right = open(ChannelField::RgbRight)?;
        rgb_right.require_exact_len(pixel_bytes)?;

        let open_fixed = |field: ChannelField| -> ShmResult<SharedSegment> {
            let segment = open(field)?;
            segment.require_len(field.size_for(&shape)?)?;
            Ok(segment)
        };

        Ok(Self {
            namespace: namespace.to_string(),
            shape,
            rgb_left,
            rgb_right,
            rgb_shape,
            timestamp: open_fixed(ChannelField::Timestamp)?,
            intrinsics: open_fixed(ChannelField::Intrinsics)?,
            fps: open_fixed(ChannelField::Fps)?,
            write_lock: open_fixed(ChannelField::WriteLock)?,
            read_lock: open_fixed(ChannelField::ReadLock)?,
        })
    }

    fn lock(&self) -> FrameLock<'_> {
        FrameLock::new(
            self.write_lock.as_atomic_bool(),
            self.read_lock.as_atomic_isize(),
        )
    }

    fn resolution(&self) -> Resolution {
        self.shape.resolution()
    }

    fn timestamp(&self) -> f64 {
        f64::from_bits(self.timestamp.as_atomic_u64().load(Ordering::Acquire))
    }

    fn store_timestamp(&self, timestamp: f64) {
        self.timestamp
            .as_atomic_u64()
            .store(timestamp.to_bits(), Ordering::Release);
    }

    fn intrinsics(&self) -> Intrinsics {
        Intrinsics(self.intrinsics.read_value())
    }

    fn frame_rate(&self) -> f64 {
        self.fps.read_value()
    }

    fn check_image(&self, image: &RgbImage) -> ShmResult<()> {
        if image.shape() != self.shape {
            return Err(ShmError::InvalidFrame {
                reason: format!(
                    "frame is {} but channel '{}' is {}",
                    image.resolution(),
                    self.namespace,
                    self.resolution()
                ),
            });
        }
        Ok(())
    }

    fn write_buffers(&self, left: &RgbImage, right: &RgbImage) -> ShmResult<()> {
        self.check_image(left)?;
        self.check_image(right)?;
        self.rgb_left.copy_from_slice(left.as_bytes())?;
        self.rgb_right.copy_from_slice(right.as_bytes())?;
        Ok(())
    }

    fn read_buffers(&self, left: &mut RgbImage, right: &mut RgbImage) -> ShmResult<()> {
        let resolution = self.resolution();
        left.reshape(resolution);
        right.reshape(resolution);
        self.rgb_left.copy_to_slice(left.as_bytes_mut())?;
        self.rgb_right.copy_to_slice(right.as_bytes_mut())?;
        Ok(())
    }

    fn segment_names(&self) -> [&str; CHANNEL_SEGMENT_COUNT] {
        [
            self.rgb_left.name(),
            self.rgb_right.name(),
            self.timestamp.name(),
            self.intrinsics.name(),
            self.fps.name(),
            self.write_lock.name(),
            self.read_lock.name(),
            self.rgb_shape.name(),
        ]
    }
}

/// Write the shape descriptor, height word last with release ordering, so a
/// receiver that sees a non-zero height also sees everything written before.
fn publish_shape(segment: &SharedSegment, shape: FrameShape) {
    segment.write_value(FrameShape { height: 0, ..shape });
    segment.as_atomic_i64().store(shape.height, Ordering::Release);
}

fn not_found(namespace: &str, field: ChannelField) -> ShmError {
    ShmError::ChannelNotFound {
        namespace: namespace.to_string(),
        segment: field.segment_name(namespace),
    }
}

/// Unlink every name, reporting the first failure. Missing names are skipped.
fn unlink_all<'a>(names: impl IntoIterator<Item = &'a str>) -> ShmResult<()> {
    let mut first_error = None;
    for name in names {
        match SharedSegment::unlink(name) {
            Ok(()) => {}
            Err(ShmError::Nix {
                source: Errno::ENOENT,
            }) => debug!("Segment {} already removed", name),
            Err(e) => {
                warn!("Failed to unlink segment {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// A channel as owned by its publisher.
///
/// Dropping an undestroyed channel unlinks its segments.
#[derive(Debug)]
pub struct Channel {
    segments: ChannelSegments,
    destroyed: bool,
}

impl Channel {
    /// Create all segments of `namespace`, sized and initialised from a sample frame.
    ///
    /// Both pixel buffers receive `sample`. The write flag starts lowered, the
    /// reader count at zero and the timestamp at the current time. Fails with
    /// `AlreadyExists` if any segment of the namespace is already present; on
    /// any failure the segments created so far are unlinked.
    pub fn create(
        namespace: &str,
        sample: &RgbImage,
        intrinsics: &Intrinsics,
        fps: f64,
    ) -> ShmResult<Self> {
        validate_namespace(namespace)?;
        let shape = sample.shape();
        shape.pixel_bytes()?;

        let mut created = Vec::with_capacity(CHANNEL_SEGMENT_COUNT);
        let segments = match ChannelSegments::create(namespace, shape, &mut created) {
            Ok(segments) => segments,
            Err(e) => {
                let _ = unlink_all(created.iter().map(String::as_str));
                return Err(e);
            }
        };

        // From here on a failure drops `channel`, which unlinks everything.
        let channel = Self {
            segments,
            destroyed: false,
        };
        let segments = &channel.segments;
        segments.write_buffers(sample, sample)?;
        segments.intrinsics.write_value(intrinsics.0);
        segments.fps.write_value(fps);
        segments.write_lock.as_atomic_bool().store(false, Ordering::SeqCst);
        segments.read_lock.as_atomic_isize().store(0, Ordering::SeqCst);
        segments.store_timestamp(now_seconds());

        publish_shape(&segments.rgb_shape, shape);

        info!(
            "Created channel '{}' ({} @ {:.1} fps)",
            namespace,
            shape.resolution(),
            fps
        );
        Ok(channel)
    }

    pub fn namespace(&self) -> &str {
        &self.segments.namespace
    }

    pub fn shape(&self) -> FrameShape {
        self.segments.shape
    }

    pub fn resolution(&self) -> Resolution {
        self.segments.resolution()
    }

    /// Last published timestamp.
    pub fn timestamp(&self) -> f64 {
        self.segments.timestamp()
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.segments.intrinsics()
    }

    pub fn frame_rate(&self) -> f64 {
        self.segments.frame_rate()
    }

    /// The channel's frame lock.
    pub fn lock(&self) -> FrameLock<'_> {
        self.segments.lock()
    }

    /// Copy both images into the pixel segments. Must be called under the write guard.
    pub fn write_buffers(&self, left: &RgbImage, right: &RgbImage) -> ShmResult<()> {
        self.segments.write_buffers(left, right)
    }

    /// Publish a timestamp (release ordering). Call after `write_buffers`.
    pub fn store_timestamp(&self, timestamp: f64) {
        self.segments.store_timestamp(timestamp);
    }

    /// Copy a pair and publish its timestamp while holding `guard`.
    pub fn publish_locked(&self, pair: &FramePair, _guard: &WriteGuard<'_>) -> ShmResult<f64> {
        self.write_buffers(&pair.left, &pair.right)?;
        let timestamp = next_timestamp(self.timestamp(), now_seconds());
        self.store_timestamp(timestamp);
        Ok(timestamp)
    }

    /// Admit the writer, copy a pair, publish its timestamp and release.
    ///
    /// Returns the published timestamp.
    pub fn write_frame(
        &self,
        pair: &FramePair,
        admission: AdmissionPolicy,
        spin_interval: Duration,
    ) -> ShmResult<f64> {
        let guard = self.lock().enter_write(admission, spin_interval);
        self.publish_locked(pair, &guard)
    }

    /// Unlink all segments. Every segment is attempted; the first failure is returned.
    pub fn destroy(mut self) -> ShmResult<()> {
        self.destroyed = true;
        let result = unlink_all(self.segments.segment_names());
        info!("Destroyed channel '{}'", self.segments.namespace);
        result
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if !self.destroyed {
            warn!(
                "Channel '{}' dropped without destroy, unlinking segments",
                self.segments.namespace
            );
            let _ = unlink_all(self.segments.segment_names());
        }
    }
}

/// A receiver's mapping of an existing channel.
#[derive(Debug)]
pub struct ChannelHandle {
    segments: ChannelSegments,
}

impl ChannelHandle {
    /// Map an existing channel.
    ///
    /// Fails immediately with `ChannelNotFound` if any segment is missing or
    /// the publisher has not finished creating it.
    pub fn attach(namespace: &str) -> ShmResult<Self> {
        validate_namespace(namespace)?;
        let segments = ChannelSegments::open(namespace)?;
        debug!(
            "Attached to channel '{}' ({})",
            namespace,
            segments.resolution()
        );
        Ok(Self { segments })
    }

    pub fn namespace(&self) -> &str {
        &self.segments.namespace
    }

    pub fn shape(&self) -> FrameShape {
        self.segments.shape
    }

    pub fn resolution(&self) -> Resolution {
        self.segments.resolution()
    }

    pub fn timestamp(&self) -> f64 {
        self.segments.timestamp()
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.segments.intrinsics()
    }

    pub fn frame_rate(&self) -> f64 {
        self.segments.frame_rate()
    }

    pub fn lock(&self) -> FrameLock<'_> {
        self.segments.lock()
    }

    /// Copy both pixel buffers into `left` and `right`, resizing them as needed.
    /// Callers hold a read guard around this.
    pub fn read_buffers(&self, left: &mut RgbImage, right: &mut RgbImage) -> ShmResult<()> {
        self.segments.read_buffers(left, right)
    }

    /// Unmap the channel. Nothing is unlinked.
    pub fn detach(self) {
        debug!("Detached from channel '{}'", self.segments.namespace);
    }
}
