//! Linux-specific shared memory operations
//!
//! Segments are POSIX shared memory objects (`shm_open`), which Linux backs
//! with files under `/dev/shm`. Names passed here carry the leading `/`.

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::getpid;
use std::fs::File;

/// Linux-specific memory mapping configuration
#[derive(Debug, Clone, Copy)]
pub struct LinuxMemoryConfig {
    /// Pre-fault the pages of the mapping (`MAP_POPULATE`)
    pub populate: bool,
}

impl Default for LinuxMemoryConfig {
    fn default() -> Self {
        Self { populate: true }
    }
}

/// Create a new shared memory object of `size` bytes and map it.
///
/// Fails with [`ShmError::AlreadyExists`] if the name is taken. The object is
/// zero-filled by the kernel. If sizing or mapping fails the object is
/// unlinked again before returning.
pub fn create_segment_mmap(
    name: &str,
    size: usize,
    config: &LinuxMemoryConfig,
) -> ShmResult<MmapMut> {
    let fd = shm_open(
        name,
        OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )
    .map_err(|errno| map_errno(errno, name))?;
    let file = File::from(fd);

    let mapped = file.set_len(size as u64).and_then(|()| {
        let mut options = MmapOptions::new();
        options.len(size);
        if config.populate {
            options.populate();
        }
        unsafe { options.map_mut(&file) }
    });

    match mapped {
        Ok(mmap) => Ok(mmap),
        Err(e) => {
            let _ = shm_unlink(name);
            Err(e.into())
        }
    }
}

/// Open an existing shared memory object read-write and map all of it.
///
/// A missing object surfaces as `ShmError::Nix { source: Errno::ENOENT }`;
/// callers translate that into their own not-found error.
pub fn attach_segment_mmap(name: &str) -> ShmResult<MmapMut> {
    let fd = shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(|errno| map_errno(errno, name))?;
    let file = File::from(fd);
    let len = file.metadata()?.len() as usize;
    if len == 0 {
        // Created but not sized yet.
        return Err(ShmError::Nix {
            source: Errno::ENOENT,
        });
    }

    let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
    Ok(mmap)
}

/// Remove a shared memory object name. Existing mappings stay valid.
pub fn unlink_segment(name: &str) -> ShmResult<()> {
    shm_unlink(name).map_err(|errno| map_errno(errno, name))
}

/// Check whether a shared memory object with this name exists.
pub fn segment_exists(name: &str) -> bool {
    match shm_open(name, OFlag::O_RDONLY, Mode::empty()) {
        Ok(_fd) => true,
        Err(Errno::EACCES) => true,
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

fn map_errno(errno: Errno, name: &str) -> ShmError {
    match errno {
        Errno::EEXIST => ShmError::AlreadyExists {
            name: name.to_string(),
        },
        Errno::EACCES | Errno::EPERM => ShmError::PermissionDenied {
            name: name.to_string(),
        },
        other => ShmError::Nix { source: other },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/stereocast_platform_{}_{}", tag, get_current_pid())
    }

    #[test]
    fn test_create_attach_unlink() {
        let name = unique_name("cycle");
        let mut writer = create_segment_mmap(&name, 64, &LinuxMemoryConfig::default()).unwrap();
        assert_eq!(writer.len(), 64);
        assert!(writer.iter().all(|&b| b == 0));
        writer[..4].copy_from_slice(b"ping");

        let reader = attach_segment_mmap(&name).unwrap();
        assert_eq!(reader.len(), 64);
        assert_eq!(&reader[..4], b"ping");
        assert!(segment_exists(&name));

        unlink_segment(&name).unwrap();
        assert!(!segment_exists(&name));

        // Mappings survive the unlink.
        assert_eq!(&reader[..4], b"ping");
    }

    #[test]
    fn test_exclusive_create() {
        let name = unique_name("exclusive");
        let _first = create_segment_mmap(&name, 8, &LinuxMemoryConfig::default()).unwrap();
        let second = create_segment_mmap(&name, 8, &LinuxMemoryConfig::default());
        assert!(matches!(second, Err(ShmError::AlreadyExists { .. })));
        unlink_segment(&name).unwrap();
    }

    #[test]
    fn test_attach_missing() {
        let result = attach_segment_mmap("/stereocast_platform_never_created");
        assert!(matches!(
            result,
            Err(ShmError::Nix {
                source: Errno::ENOENT
            })
        ));
    }

    #[test]
    fn test_unlink_missing() {
        let result = unlink_segment("/stereocast_platform_never_created");
        assert!(matches!(
            result,
            Err(ShmError::Nix {
                source: Errno::ENOENT
            })
        ));
    }

    #[test]
    fn test_current_pid() {
        assert_eq!(get_current_pid(), std::process::id());
    }
}
