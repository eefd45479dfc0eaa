//! Subcommand implementations.

use common::config::{ReceiverSettings, StereocastConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use stereocast_shared_memory::{
    ChannelDiscovery, ChannelInfo, FrameSnapshot, Publisher, PublisherConfig, Receiver,
    ReceiverConfig, ShmError, SyntheticCamera, now_seconds,
};
use tracing::{debug, info, warn};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

const WATCH_REPORT_INTERVAL: Duration = Duration::from_secs(1);
const WATCH_FRAME_TIMEOUT: Duration = Duration::from_secs(1);
const ATTACH_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Clears `running` on SIGINT/SIGTERM.
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })
}

/// Run a synthetic stereo camera publisher until interrupted.
pub fn publish(config: &StereocastConfig) -> CommandResult {
    let camera_settings = &config.camera;
    let camera = SyntheticCamera::new(
        camera_settings.width,
        camera_settings.height,
        camera_settings.fps,
    )
    .with_pacing(camera_settings.pace);

    let publisher_config = PublisherConfig::from(&config.publisher);
    info!(
        "Publishing {}x{} @ {} fps on '{}' ({} admission)",
        camera_settings.width,
        camera_settings.height,
        camera_settings.fps,
        publisher_config.namespace,
        publisher_config.admission
    );

    let mut publisher = Publisher::new(camera, publisher_config)?;
    install_shutdown_handler(publisher.running_flag())?;

    let stats = publisher.run()?;
    info!(
        "Publisher stopped: {} frames, {} not-ready retries, max admission wait {:?}",
        stats.frames_published, stats.not_ready_retries, stats.max_admission_wait
    );
    Ok(())
}

/// Attach to a channel and report frame rate, staleness and lock contention.
pub fn watch(
    namespace: &str,
    settings: &ReceiverSettings,
    frames: Option<u64>,
    attach_timeout: Duration,
) -> CommandResult {
    let running = Arc::new(AtomicBool::new(true));
    install_shutdown_handler(Arc::clone(&running))?;

    let Some(mut receiver) = attach(namespace, ReceiverConfig::from(settings), attach_timeout, &running)?
    else {
        return Ok(());
    };
    info!(
        "Attached to '{}': {} @ {} fps, fx={:.1}",
        namespace,
        receiver.resolution(),
        receiver.frame_rate(),
        receiver.intrinsics().fx()
    );

    let discovery = ChannelDiscovery::new();
    let mut snapshot = FrameSnapshot::with_resolution(receiver.resolution());
    let mut total: u64 = 0;
    let mut window_frames: u64 = 0;
    let mut window_spins: u64 = 0;
    let mut window_staleness = 0.0;
    let mut window_start = Instant::now();

    while running.load(Ordering::SeqCst) && frames.is_none_or(|limit| total < limit) {
        if receiver
            .wait_for_next_frame_timeout(WATCH_FRAME_TIMEOUT)
            .is_none()
        {
            if !discovery.channel_exists(namespace) {
                warn!("Channel '{}' went away", namespace);
                break;
            }
            debug!("No new frame on '{}' for {:?}", namespace, WATCH_FRAME_TIMEOUT);
            continue;
        }

        receiver.read_frame_into(&mut snapshot)?;
        total += 1;
        window_frames += 1;
        window_spins += receiver.last_read_spins();
        window_staleness += now_seconds() - snapshot.timestamp;

        let elapsed = window_start.elapsed();
        if elapsed >= WATCH_REPORT_INTERVAL {
            info!(
                "'{}': {:.1} fps, mean staleness {:.3} ms, {} read spins",
                namespace,
                window_frames as f64 / elapsed.as_secs_f64(),
                window_staleness / window_frames as f64 * 1e3,
                window_spins
            );
            window_frames = 0;
            window_spins = 0;
            window_staleness = 0.0;
            window_start = Instant::now();
        }
    }

    info!("Watched {} frames on '{}'", total, namespace);
    receiver.detach();
    Ok(())
}

/// Retry attaching while the channel does not exist yet.
fn attach(
    namespace: &str,
    config: ReceiverConfig,
    timeout: Duration,
    running: &AtomicBool,
) -> Result<Option<Receiver>, ShmError> {
    let start = Instant::now();
    loop {
        match Receiver::attach_with(namespace, config) {
            Ok(receiver) => return Ok(Some(receiver)),
            Err(e) if e.is_channel_not_found() && start.elapsed() < timeout => {
                if !running.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                std::thread::sleep(ATTACH_RETRY_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Print every channel in the shared memory directory.
pub fn list(json: bool) -> CommandResult {
    let channels = ChannelDiscovery::new().list_channels()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
        return Ok(());
    }

    if channels.is_empty() {
        println!("No channels found");
        return Ok(());
    }
    println!(
        "{:<24} {:>8} {:>11} {:>8} {:>8} {:>8}",
        "NAMESPACE", "SEGMENTS", "RESOLUTION", "FPS", "READERS", "STATE"
    );
    for info in &channels {
        println!("{}", format_row(info));
    }
    Ok(())
}

fn format_row(info: &ChannelInfo) -> String {
    let resolution = info
        .resolution
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    let fps = info
        .fps
        .map(|f| format!("{f:.1}"))
        .unwrap_or_else(|| "-".to_string());
    let readers = info
        .readers
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());
    let state = match (info.complete, info.writing) {
        (false, _) => "partial",
        (true, Some(true)) => "writing",
        (true, _) => "idle",
    };
    format!(
        "{:<24} {:>6}/8 {:>11} {:>8} {:>8} {:>8}",
        info.namespace, info.segments_present, resolution, fps, readers, state
    )
}

/// Unlink whatever segments of `namespace` are left.
pub fn cleanup(namespace: &str) -> CommandResult {
    let removed = ChannelDiscovery::new().remove_stale(namespace)?;
    info!("Removed {} segment(s) of '{}'", removed, namespace);
    println!("Removed {removed} segment(s) of '{namespace}'");
    Ok(())
}
