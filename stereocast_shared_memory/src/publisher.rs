//! Publisher: owns the camera and the channel.
//!
//! The publisher captures the first pair, creates the channel from it and
//! then publishes one pair per loop iteration until its running flag is
//! cleared or the camera fails. Whatever ends the loop, the channel's
//! segments are unlinked before `run` returns.

use crate::camera::{CaptureStatus, StereoCamera, capture_pair};
use crate::channel::Channel;
use crate::error::ShmResult;
use crate::frame::FramePair;
use crate::layout::validate_namespace;
use common::config::PublisherSettings;
use common::shm::consts::{CAPTURE_RETRY_INTERVAL, LOCK_SPIN_INTERVAL, STATS_LOG_INTERVAL};
use common::shm::policy::AdmissionPolicy;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Publisher parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Channel namespace
    pub namespace: String,
    /// Writer admission policy
    pub admission: AdmissionPolicy,
    /// Sleep between lock checks
    pub lock_spin_interval: Duration,
    /// Sleep before retrying a capture that was not ready
    pub retry_interval: Duration,
}

impl PublisherConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            admission: AdmissionPolicy::default(),
            lock_spin_interval: LOCK_SPIN_INTERVAL,
            retry_interval: CAPTURE_RETRY_INTERVAL,
        }
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }
}

impl From<&PublisherSettings> for PublisherConfig {
    fn from(settings: &PublisherSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            admission: settings.admission,
            lock_spin_interval: settings.lock_spin_interval(),
            retry_interval: settings.capture_retry_interval(),
        }
    }
}

/// Counters kept by the publish loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublisherStats {
    /// Pairs copied into the channel
    pub frames_published: u64,
    /// Capture attempts that reported no frame yet
    pub not_ready_retries: u64,
    /// Longest wait for write admission
    pub max_admission_wait: Duration,
    /// Lock polls summed over all writes
    pub admission_spins: u64,
    /// Timestamp of the last published pair
    pub last_timestamp: f64,
}

/// Camera-to-channel publish loop.
pub struct Publisher<C: StereoCamera> {
    camera: C,
    config: PublisherConfig,
    running: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    stats: PublisherStats,
}

impl<C: StereoCamera> Publisher<C> {
    /// Wrap a camera. Nothing is created until [`run`](Self::run).
    pub fn new(camera: C, config: PublisherConfig) -> ShmResult<Self> {
        validate_namespace(&config.namespace)?;
        Ok(Self {
            camera,
            config,
            running: Arc::new(AtomicBool::new(true)),
            ready: Arc::new(AtomicBool::new(false)),
            stats: PublisherStats::default(),
        })
    }

    /// Cleared to stop the loop; checked once per iteration.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Set once the first pair is published, cleared before teardown.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    pub fn stats(&self) -> &PublisherStats {
        &self.stats
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Capture, create the channel and publish until stopped or failed.
    ///
    /// Blocks. The channel is destroyed on every exit path.
    ///
    /// # Errors
    /// `CaptureFailure` if the camera fails, any channel creation error, or
    /// `InvalidFrame` if the camera changes resolution mid-stream.
    pub fn run(&mut self) -> ShmResult<PublisherStats> {
        info!(
            "Starting publisher on '{}' with {} camera ({} @ {:.1} fps, admission={})",
            self.config.namespace,
            self.camera.name(),
            self.camera.resolution(),
            self.camera.frame_rate(),
            self.config.admission
        );

        match self.stream() {
            Ok(()) => {
                info!(
                    "Publisher on '{}' stopped after {} frames",
                    self.config.namespace, self.stats.frames_published
                );
                Ok(self.stats.clone())
            }
            Err(e) => {
                error!("Publisher on '{}' terminated: {}", self.config.namespace, e);
                Err(e)
            }
        }
    }

    fn stream(&mut self) -> ShmResult<()> {
        let Some(first) = self.capture()? else {
            info!("Publisher stopped before the first frame");
            return Ok(());
        };

        let channel = Channel::create(
            &self.config.namespace,
            &first.left,
            &self.camera.intrinsics(),
            self.camera.frame_rate(),
        )?;

        let result = self.publish(&channel, &first).and_then(|()| {
            self.ready.store(true, Ordering::SeqCst);
            self.publish_loop(&channel)
        });
        self.ready.store(false, Ordering::SeqCst);
        let teardown = channel.destroy();
        result.and(teardown)
    }

    /// Start the loop on its own thread.
    pub fn spawn(camera: C, config: PublisherConfig) -> ShmResult<PublisherHandle>
    where
        C: 'static,
    {
        let mut publisher = Self::new(camera, config)?;
        let namespace = publisher.config.namespace.clone();
        let running = publisher.running_flag();
        let ready = publisher.ready_flag();
        let thread = std::thread::Builder::new()
            .name(format!("publisher-{namespace}"))
            .spawn(move || publisher.run())?;

        Ok(PublisherHandle {
            namespace,
            running,
            ready,
            thread: Some(thread),
        })
    }

    fn publish_loop(&mut self, channel: &Channel) -> ShmResult<()> {
        while self.running.load(Ordering::SeqCst) {
            let Some(pair) = self.capture()? else {
                break;
            };
            self.publish(channel, &pair)?;
        }
        Ok(())
    }

    /// Capture one pair, retrying while the camera is not ready.
    /// `None` if stopped meanwhile.
    fn capture(&mut self) -> ShmResult<Option<FramePair>> {
        while self.running.load(Ordering::SeqCst) {
            match capture_pair(&mut self.camera) {
                CaptureStatus::Captured(pair) => return Ok(Some(pair)),
                CaptureStatus::NotReady => {
                    self.stats.not_ready_retries += 1;
                    std::thread::sleep(self.config.retry_interval);
                }
                CaptureStatus::Failed(e) => {
                    error!("Capture failed on {} camera: {}", self.camera.name(), e);
                    return Err(e.into());
                }
            }
        }
        Ok(None)
    }

    fn publish(&mut self, channel: &Channel, pair: &FramePair) -> ShmResult<()> {
        let start = Instant::now();
        let guard = channel
            .lock()
            .enter_write(self.config.admission, self.config.lock_spin_interval);
        let waited = start.elapsed();
        let spins = guard.spins();
        let timestamp = channel.publish_locked(pair, &guard)?;
        drop(guard);

        let stats = &mut self.stats;
        stats.frames_published += 1;
        stats.admission_spins += spins;
        stats.max_admission_wait = stats.max_admission_wait.max(waited);
        stats.last_timestamp = timestamp;

        if stats.frames_published % STATS_LOG_INTERVAL == 0 {
            debug!(
                "Publisher '{}': {} frames, {} not-ready retries, max admission wait {}us",
                self.config.namespace,
                stats.frames_published,
                stats.not_ready_retries,
                stats.max_admission_wait.as_micros()
            );
        }
        Ok(())
    }
}

/// Control handle for a publisher running on its own thread.
///
/// Dropping the handle stops the publisher and waits for it.
#[derive(Debug)]
pub struct PublisherHandle {
    namespace: String,
    running: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
    thread: Option<JoinHandle<ShmResult<PublisherStats>>>,
}

impl PublisherHandle {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Ask the loop to stop after the current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the channel exists and holds at least one published pair.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether the publisher thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait until the channel exists. Returns `false` on timeout or if the
    /// publisher exited first (use [`join`](Self::join) to get its error).
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_ready() {
                return true;
            }
            if self.is_finished() || Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// The flag `stop` clears, for use in signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Wait for the publisher thread and return its result.
    ///
    /// Does not stop the loop; call [`stop`](Self::stop) first unless the
    /// camera is expected to fail. A panic in the publisher is resumed here.
    pub fn join(mut self) -> ShmResult<PublisherStats> {
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(PublisherStats::default()),
        }
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop();
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticCamera;
    use crate::error::ShmError;
    use crate::layout::ChannelField;
    use crate::segment::SharedSegment;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn run_logged<C: StereoCamera>(
        publisher: &mut Publisher<C>,
    ) -> (ShmResult<PublisherStats>, String) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, || publisher.run());
        (result, log.contents())
    }

    #[test]
    fn test_channel_create_failure_is_logged() {
        let ns = format!("test_pub_create_fail_{}", std::process::id());
        let blocker = ChannelField::Fps.segment_name(&ns);
        let _segment = SharedSegment::create(&blocker, 8).unwrap();

        let mut publisher =
            Publisher::new(SyntheticCamera::new(16, 8, 100.0), PublisherConfig::new(&ns)).unwrap();
        let (result, log) = run_logged(&mut publisher);

        assert!(matches!(result, Err(ShmError::AlreadyExists { .. })), "{result:?}");
        assert!(log.contains("ERROR"), "{log}");
        assert!(log.contains(&format!("Publisher on '{ns}' terminated")), "{log}");
        assert!(!publisher.ready_flag().load(Ordering::SeqCst));
        assert_eq!(publisher.stats().frames_published, 0);

        // Segments created before the collision were rolled back.
        assert!(SharedSegment::open(&ChannelField::RgbLeft.segment_name(&ns)).is_err());
        SharedSegment::unlink(&blocker).unwrap();
    }

    #[test]
    fn test_capture_failure_is_logged() {
        let ns = format!("test_pub_capture_fail_{}", std::process::id());
        let camera = SyntheticCamera::new(16, 8, 100.0).fail_after(3);
        let mut publisher = Publisher::new(camera, PublisherConfig::new(&ns)).unwrap();
        let (result, log) = run_logged(&mut publisher);

        assert!(matches!(result, Err(ShmError::CaptureFailure(_))), "{result:?}");
        assert!(log.contains(&format!("Publisher on '{ns}' terminated")), "{log}");
        assert_eq!(publisher.stats().frames_published, 3);
    }
}
