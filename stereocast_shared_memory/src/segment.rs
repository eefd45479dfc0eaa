//! A single mapped shared memory segment.
//!
//! Every channel field lives in its own POSIX shared memory object. This
//! module wraps one such mapping and exposes typed views over it: atomics for
//! the lock and timestamp fields, plain-data reads and writes for the shape,
//! intrinsics and frame rate, and bulk byte copies for the pixel buffers.

use crate::error::{ShmError, ShmResult};
use crate::platform::{LinuxMemoryConfig, attach_segment_mmap, create_segment_mmap, unlink_segment};
use memmap2::MmapMut;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicIsize, AtomicU64};

/// Types that may be read from any initialised bit pattern.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` (or primitive) with no padding and no
/// invalid bit patterns.
pub unsafe trait PlainData: Copy {}

unsafe impl PlainData for f64 {}
unsafe impl PlainData for i64 {}
unsafe impl<const N: usize> PlainData for [f64; N] {}

/// A mapped POSIX shared memory object.
pub struct SharedSegment {
    name: String,
    ptr: NonNull<u8>,
    len: usize,
    // Keeps the mapping alive; all access goes through `ptr`.
    _mmap: MmapMut,
}

// SAFETY: the mapping is process-shared memory. Concurrent access to the lock
// and timestamp fields uses atomics; pixel and descriptor accesses are ordered
// by the frame lock and the release/acquire timestamp protocol.
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Create a new zero-filled segment. Fails if the name already exists.
    pub fn create(name: &str, size: usize) -> ShmResult<Self> {
        let config = LinuxMemoryConfig::default();
        let mmap = create_segment_mmap(name, size, &config)?;
        Ok(Self::from_mmap(name, mmap))
    }

    /// Map an existing segment at whatever size it currently has.
    pub fn open(name: &str) -> ShmResult<Self> {
        let mmap = attach_segment_mmap(name)?;
        Ok(Self::from_mmap(name, mmap))
    }

    /// Remove the segment's name from the system.
    pub fn unlink(name: &str) -> ShmResult<()> {
        unlink_segment(name)
    }

    fn from_mmap(name: &str, mut mmap: MmapMut) -> Self {
        let len = mmap.len();
        let ptr = NonNull::new(mmap.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            name: name.to_string(),
            ptr,
            len,
            _mmap: mmap,
        }
    }

    /// Full shared memory name, including the leading `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fail with `LayoutMismatch` unless the segment holds at least `expected` bytes.
    pub fn require_len(&self, expected: usize) -> ShmResult<()> {
        if self.len < expected {
            return Err(ShmError::LayoutMismatch {
                segment: self.name.clone(),
                expected,
                actual: self.len,
            });
        }
        Ok(())
    }

    /// Fail with `LayoutMismatch` unless the segment holds exactly `expected` bytes.
    pub fn require_exact_len(&self, expected: usize) -> ShmResult<()> {
        if self.len != expected {
            return Err(ShmError::LayoutMismatch {
                segment: self.name.clone(),
                expected,
                actual: self.len,
            });
        }
        Ok(())
    }

    fn view<T>(&self) -> *mut T {
        debug_assert!(size_of::<T>() <= self.len);
        debug_assert!(validate_memory_alignment(self.ptr.as_ptr(), align_of::<T>()));
        self.ptr.as_ptr().cast::<T>()
    }

    /// View the first byte as the write flag.
    pub fn as_atomic_bool(&self) -> &AtomicBool {
        // SAFETY: mappings are page aligned and at least one byte long; the
        // byte is only ever accessed atomically.
        unsafe { &*self.view::<AtomicBool>() }
    }

    /// View the first word as the reader count.
    pub fn as_atomic_isize(&self) -> &AtomicIsize {
        // SAFETY: page aligned, sized by `ChannelField::fixed_size`.
        unsafe { &*self.view::<AtomicIsize>() }
    }

    /// View the first 8 bytes as an `i64`, the height word of the shape descriptor.
    pub fn as_atomic_i64(&self) -> &AtomicI64 {
        // SAFETY: page aligned, sized by `ChannelField::fixed_size`.
        unsafe { &*self.view::<AtomicI64>() }
    }

    /// View the first 8 bytes as the bit pattern of an `f64`.
    pub fn as_atomic_u64(&self) -> &AtomicU64 {
        // SAFETY: page aligned, sized by `ChannelField::fixed_size`.
        unsafe { &*self.view::<AtomicU64>() }
    }

    /// Read a plain-data value from the start of the segment.
    pub fn read_value<T: PlainData>(&self) -> T {
        // SAFETY: `T` accepts any bit pattern; volatile so another process's
        // writes are not assumed away.
        unsafe { self.view::<T>().read_volatile() }
    }

    /// Write a plain-data value to the start of the segment.
    pub fn write_value<T: PlainData>(&self, value: T) {
        // SAFETY: see `read_value`.
        unsafe { self.view::<T>().write_volatile(value) }
    }

    /// Copy `src` over the whole segment. `src.len()` must equal the segment length.
    pub fn copy_from_slice(&self, src: &[u8]) -> ShmResult<()> {
        self.require_exact_len(src.len())?;
        // SAFETY: lengths match; the source is private memory so the ranges
        // cannot overlap.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), self.len) };
        Ok(())
    }

    /// Copy the whole segment into `dst`. `dst.len()` must equal the segment length.
    pub fn copy_to_slice(&self, dst: &mut [u8]) -> ShmResult<()> {
        self.require_exact_len(dst.len())?;
        // SAFETY: as in `copy_from_slice`.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.as_mut_ptr(), self.len) };
        Ok(())
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("name", &self.name)
            .field("len", &self.len)
            .finish()
    }
}

/// Validate memory alignment
pub fn validate_memory_alignment(ptr: *const u8, alignment: usize) -> bool {
    (ptr as usize) % alignment == 0
}
