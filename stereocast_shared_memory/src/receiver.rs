//! Receiver: attaches to a channel and copies published frames out.
//!
//! Receivers never block the publisher for longer than one frame copy and
//! never modify anything but the reader count. Any number of receivers, in
//! any number of processes, may attach to the same channel.

use crate::channel::ChannelHandle;
use crate::error::ShmResult;
use crate::frame::{FrameSnapshot, Intrinsics, Resolution};
use common::config::ReceiverSettings;
use common::shm::consts::{FRAME_POLL_INTERVAL, LOCK_SPIN_INTERVAL};
use std::time::{Duration, Instant};
use tracing::trace;

/// Receiver polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Sleep between timestamp checks in `wait_for_next_frame`
    pub poll_interval: Duration,
    /// Sleep between lock checks in `read_frame`
    pub lock_spin_interval: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            poll_interval: FRAME_POLL_INTERVAL,
            lock_spin_interval: LOCK_SPIN_INTERVAL,
        }
    }
}

impl From<&ReceiverSettings> for ReceiverConfig {
    fn from(settings: &ReceiverSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            lock_spin_interval: settings.lock_spin_interval(),
        }
    }
}

/// Consumer side of a channel.
#[derive(Debug)]
pub struct Receiver {
    channel: ChannelHandle,
    config: ReceiverConfig,
    last_timestamp: f64,
    last_read_spins: u64,
}

impl Receiver {
    /// Attach with default polling intervals.
    ///
    /// # Errors
    /// `ChannelNotFound` if the publisher has not created the channel (yet).
    pub fn attach(namespace: &str) -> ShmResult<Self> {
        Self::attach_with(namespace, ReceiverConfig::default())
    }

    /// Attach with explicit polling intervals.
    ///
    /// Frames published before this call do not count as new.
    pub fn attach_with(namespace: &str, config: ReceiverConfig) -> ShmResult<Self> {
        let channel = ChannelHandle::attach(namespace)?;
        let last_timestamp = channel.timestamp();
        Ok(Self {
            channel,
            config,
            last_timestamp,
            last_read_spins: 0,
        })
    }

    pub fn namespace(&self) -> &str {
        self.channel.namespace()
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Timestamp most recently returned by a wait, or the one seen at attach.
    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    /// Whether a frame newer than [`last_timestamp`](Self::last_timestamp) is available.
    pub fn has_new_frame(&self) -> bool {
        self.channel.timestamp() > self.last_timestamp
    }

    /// Block until a frame newer than the last observed one is published.
    ///
    /// Returns its timestamp. There is no timeout: if the publisher is gone
    /// this never returns.
    pub fn wait_for_next_frame(&mut self) -> f64 {
        loop {
            if let Some(timestamp) = self.poll_next() {
                return timestamp;
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Like [`wait_for_next_frame`](Self::wait_for_next_frame), giving up
    /// after `timeout`.
    pub fn wait_for_next_frame_timeout(&mut self, timeout: Duration) -> Option<f64> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(timestamp) = self.poll_next() {
                return Some(timestamp);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    fn poll_next(&mut self) -> Option<f64> {
        let timestamp = self.channel.timestamp();
        (timestamp > self.last_timestamp).then(|| {
            self.last_timestamp = timestamp;
            timestamp
        })
    }

    /// Copy the current frame pair out of the channel.
    pub fn read_frame(&mut self) -> ShmResult<FrameSnapshot> {
        let mut snapshot = FrameSnapshot::with_resolution(self.channel.resolution());
        self.read_frame_into(&mut snapshot)?;
        Ok(snapshot)
    }

    /// Copy the current frame pair into `snapshot`, reusing its buffers.
    ///
    /// Waits while a write is in progress, registers as a reader for the
    /// duration of the copy and deregisters afterwards, also on error.
    pub fn read_frame_into(&mut self, snapshot: &mut FrameSnapshot) -> ShmResult<()> {
        let lock = self.channel.lock();
        let guard = lock.enter_read(self.config.lock_spin_interval);
        self.channel
            .read_buffers(&mut snapshot.left, &mut snapshot.right)?;
        snapshot.timestamp = self.channel.timestamp();
        self.last_read_spins = guard.spins();
        drop(guard);

        snapshot.intrinsics = self.channel.intrinsics();
        if self.last_read_spins > 0 {
            trace!(
                "Reader on '{}' waited {} polls for the writer",
                self.channel.namespace(),
                self.last_read_spins
            );
        }
        Ok(())
    }

    /// Lock polls spent waiting for the writer during the last read.
    pub fn last_read_spins(&self) -> u64 {
        self.last_read_spins
    }

    /// Current channel timestamp (unsynchronised).
    pub fn timestamp(&self) -> f64 {
        self.channel.timestamp()
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.channel.intrinsics()
    }

    pub fn frame_rate(&self) -> f64 {
        self.channel.frame_rate()
    }

    pub fn resolution(&self) -> Resolution {
        self.channel.resolution()
    }

    /// Unmap the channel. The publisher's segments are left alone.
    pub fn detach(self) {
        self.channel.detach();
    }
}
