//! Channel discovery and stale segment removal

use crate::channel::ChannelHandle;
use crate::error::{ShmError, ShmResult};
use crate::frame::Resolution;
use crate::layout::{ChannelField, LayoutSummary, validate_namespace};
use crate::platform::segment_exists;
use crate::segment::SharedSegment;
use common::shm::consts::{CHANNEL_SEGMENT_COUNT, SHM_DIR};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// What discovery knows about one namespace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    /// Channel namespace
    pub namespace: String,
    /// How many of the eight segments exist
    pub segments_present: usize,
    /// All eight segments exist and the channel could be attached
    pub complete: bool,
    /// Frame size, if attached
    pub resolution: Option<Resolution>,
    /// Bytes across all segments, if attached
    pub total_bytes: Option<usize>,
    /// Nominal frame rate, if attached
    pub fps: Option<f64>,
    /// Last published timestamp, if attached
    pub timestamp: Option<f64>,
    /// Receivers currently copying, if attached
    pub readers: Option<isize>,
    /// Write in progress, if attached
    pub writing: Option<bool>,
    /// Modification time of the shape segment
    pub created_at: Option<SystemTime>,
}

impl ChannelInfo {
    fn partial(namespace: &str, segments_present: usize) -> Self {
        Self {
            namespace: namespace.to_string(),
            segments_present,
            complete: false,
            resolution: None,
            total_bytes: None,
            fps: None,
            timestamp: None,
            readers: None,
            writing: None,
            created_at: None,
        }
    }
}

/// Scans the shared memory directory for channels.
#[derive(Debug, Clone)]
pub struct ChannelDiscovery {
    shm_dir: PathBuf,
}

impl Default for ChannelDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelDiscovery {
    pub fn new() -> Self {
        Self {
            shm_dir: PathBuf::from(SHM_DIR),
        }
    }

    /// All namespaces that have at least one segment, sorted by name.
    pub fn list_channels(&self) -> ShmResult<Vec<ChannelInfo>> {
        if !self.shm_dir.exists() {
            return Ok(Vec::new());
        }

        let mut namespaces: BTreeMap<String, BTreeSet<ChannelField>> = BTreeMap::new();
        for entry in std::fs::read_dir(&self.shm_dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some((namespace, field)) = ChannelField::parse_segment_file(&file_name) {
                namespaces
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(field);
            }
        }

        let channels = namespaces
            .into_iter()
            .map(|(namespace, fields)| self.describe(&namespace, fields.len()))
            .collect();
        Ok(channels)
    }

    /// Information about one namespace, `None` if none of its segments exist.
    pub fn find_channel(&self, namespace: &str) -> ShmResult<Option<ChannelInfo>> {
        validate_namespace(namespace)?;
        let present = ChannelField::ALL
            .iter()
            .filter(|field| segment_exists(&field.segment_name(namespace)))
            .count();
        Ok((present > 0).then(|| self.describe(namespace, present)))
    }

    /// Whether all eight segments of `namespace` exist.
    pub fn channel_exists(&self, namespace: &str) -> bool {
        validate_namespace(namespace).is_ok()
            && ChannelField::ALL
                .iter()
                .all(|field| segment_exists(&field.segment_name(namespace)))
    }

    /// Unlink whatever segments of `namespace` remain. Returns how many were removed.
    ///
    /// Meant for segments left behind by a publisher that was killed. Running
    /// this against a live publisher pulls the channel out from under it.
    pub fn remove_stale(&self, namespace: &str) -> ShmResult<usize> {
        validate_namespace(namespace)?;
        let mut removed = 0;
        let mut first_error = None;
        for field in ChannelField::ALL {
            let name = field.segment_name(namespace);
            match SharedSegment::unlink(&name) {
                Ok(()) => {
                    debug!("Removed segment {}", name);
                    removed += 1;
                }
                Err(ShmError::Nix {
                    source: Errno::ENOENT,
                }) => {}
                Err(e) => {
                    warn!("Failed to remove segment {}: {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if removed > 0 {
            info!("Removed {} stale segments of '{}'", removed, namespace);
        }
        Ok(removed)
    }

    fn describe(&self, namespace: &str, segments_present: usize) -> ChannelInfo {
        let mut info = ChannelInfo::partial(namespace, segments_present);
        if segments_present != CHANNEL_SEGMENT_COUNT {
            return info;
        }
        let handle = match ChannelHandle::attach(namespace) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("Cannot attach to '{}': {}", namespace, e);
                return info;
            }
        };

        let shape = handle.shape();
        let lock = handle.lock();
        info.complete = true;
        info.resolution = Some(handle.resolution());
        info.total_bytes = LayoutSummary::for_shape(&shape)
            .ok()
            .map(|summary| summary.total_bytes);
        info.fps = Some(handle.frame_rate());
        info.timestamp = Some(handle.timestamp());
        info.readers = Some(lock.readers());
        info.writing = Some(lock.is_writing());
        info.created_at = std::fs::metadata(
            self.shm_dir
                .join(format!("{}_{}", namespace, ChannelField::RgbShape)),
        )
        .and_then(|meta| meta.modified())
        .ok();
        info
    }
}
