//! Cross-process frame lock.
//!
//! The lock is two words in shared memory: a write flag and a reader count.
//! There is exactly one writer per channel and any number of readers, each
//! possibly in a different process. Waiting is done by polling with a short
//! sleep; there is no timeout and no cancellation.
//!
//! Readers always follow the same protocol: wait for the flag to drop,
//! register in the count, re-check the flag and back out if a writer raised
//! it meanwhile. What the writer waits for is chosen by [`AdmissionPolicy`].

use common::shm::policy::AdmissionPolicy;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::time::Duration;

/// Borrowed view of a channel's write flag and reader count.
#[derive(Debug, Clone, Copy)]
pub struct FrameLock<'a> {
    write_flag: &'a AtomicBool,
    readers: &'a AtomicIsize,
}

impl<'a> FrameLock<'a> {
    pub fn new(write_flag: &'a AtomicBool, readers: &'a AtomicIsize) -> Self {
        Self {
            write_flag,
            readers,
        }
    }

    /// One admission attempt for the writer.
    ///
    /// With `Exclusive` the flag is raised even when the attempt fails, so new
    /// readers back off while the writer waits for the current ones to leave.
    pub fn try_enter_write(&self, policy: AdmissionPolicy) -> bool {
        match policy {
            AdmissionPolicy::Exclusive => {
                self.write_flag.store(true, Ordering::SeqCst);
                self.readers.load(Ordering::SeqCst) <= 0
            }
            AdmissionPolicy::Legacy => {
                if self.readers.load(Ordering::SeqCst) > 0 && self.write_flag.load(Ordering::SeqCst)
                {
                    return false;
                }
                self.write_flag.store(true, Ordering::SeqCst);
                true
            }
        }
    }

    /// Spin until the writer is admitted.
    pub fn enter_write(&self, policy: AdmissionPolicy, spin_interval: Duration) -> WriteGuard<'a> {
        let mut spins = 0u64;
        while !self.try_enter_write(policy) {
            spins += 1;
            pause(spin_interval);
        }
        WriteGuard { lock: *self, spins }
    }

    /// Lower the write flag.
    pub fn exit_write(&self) {
        self.write_flag.store(false, Ordering::SeqCst);
    }

    /// One admission attempt for a reader.
    pub fn try_enter_read(&self) -> bool {
        if self.write_flag.load(Ordering::SeqCst) {
            return false;
        }
        self.readers.fetch_add(1, Ordering::SeqCst);
        if self.write_flag.load(Ordering::SeqCst) {
            self.readers.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Spin until the reader is admitted.
    pub fn enter_read(&self, spin_interval: Duration) -> ReadGuard<'a> {
        let mut spins = 0u64;
        while !self.try_enter_read() {
            spins += 1;
            pause(spin_interval);
        }
        ReadGuard { lock: *self, spins }
    }

    /// Deregister a reader.
    pub fn exit_read(&self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_writing(&self) -> bool {
        self.write_flag.load(Ordering::SeqCst)
    }

    pub fn readers(&self) -> isize {
        self.readers.load(Ordering::SeqCst)
    }
}

/// Held by the writer while it copies a frame. Lowers the flag on drop.
#[derive(Debug)]
#[must_use = "the write flag is lowered as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: FrameLock<'a>,
    spins: u64,
}

impl WriteGuard<'_> {
    /// Poll iterations spent waiting for admission.
    pub fn spins(&self) -> u64 {
        self.spins
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit_write();
    }
}

/// Held by a reader while it copies a frame. Deregisters on drop.
#[derive(Debug)]
#[must_use = "the reader is deregistered as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: FrameLock<'a>,
    spins: u64,
}

impl ReadGuard<'_> {
    /// Poll iterations spent waiting for admission.
    pub fn spins(&self) -> u64 {
        self.spins
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit_read();
    }
}

fn pause(interval: Duration) {
    if interval.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(interval);
    }
}
