//! Channel creation, attachment and teardown

use stereocast_shared_memory::{
    AdmissionPolicy, Channel, ChannelField, ChannelHandle, FramePair, Intrinsics, Receiver,
    Resolution, RgbImage, ShmError, ShmResult, SyntheticCamera,
};
use std::path::Path;
use std::time::Duration;

fn namespace(tag: &str) -> String {
    format!("test_lc_{}_{}", tag, std::process::id())
}

fn segment_file(namespace: &str, field: ChannelField) -> String {
    format!("/dev/shm/{}_{}", namespace, field)
}

fn all_segments_exist(namespace: &str) -> bool {
    ChannelField::ALL
        .iter()
        .all(|&field| Path::new(&segment_file(namespace, field)).exists())
}

fn no_segments_exist(namespace: &str) -> bool {
    ChannelField::ALL
        .iter()
        .all(|&field| !Path::new(&segment_file(namespace, field)).exists())
}

#[test]
fn test_create_attach_round_trip() -> ShmResult<()> {
    let ns = namespace("round_trip");
    let camera = SyntheticCamera::new(64, 48, 30.0);
    let sample = camera.expected_pair(0);
    let intrinsics = Intrinsics::from_params(48.0, 48.0, 32.0, 24.0);

    let channel = Channel::create(&ns, &sample.left, &intrinsics, 30.0)?;
    assert!(all_segments_exist(&ns));

    let handle = ChannelHandle::attach(&ns)?;
    assert_eq!(handle.resolution(), Resolution::new(64, 48));
    assert_eq!(handle.intrinsics(), intrinsics);
    assert_eq!(handle.frame_rate(), 30.0);
    assert_eq!(handle.timestamp(), channel.timestamp());
    assert!(!handle.lock().is_writing());
    assert_eq!(handle.lock().readers(), 0);

    let pair = camera.expected_pair(7);
    let published = channel.write_frame(&pair, AdmissionPolicy::Exclusive, Duration::ZERO)?;
    assert_eq!(handle.timestamp(), published);

    let mut receiver = Receiver::attach(&ns)?;
    let snapshot = receiver.read_frame()?;
    assert_eq!(snapshot.left, pair.left);
    assert_eq!(snapshot.right, pair.right);
    assert_eq!(snapshot.timestamp, published);
    assert_eq!(snapshot.intrinsics, intrinsics);
    assert_eq!(handle.lock().readers(), 0);

    receiver.detach();
    handle.detach();
    // Detaching leaves the segments alone.
    assert!(all_segments_exist(&ns));

    channel.destroy()?;
    assert!(no_segments_exist(&ns));
    Ok(())
}

#[test]
fn test_sample_is_visible_before_first_write() -> ShmResult<()> {
    let ns = namespace("sample");
    let sample = SyntheticCamera::new(8, 4, 30.0).expected_pair(3);
    let channel = Channel::create(&ns, &sample.left, &Intrinsics::default(), 30.0)?;

    let snapshot = Receiver::attach(&ns)?.read_frame()?;
    assert_eq!(snapshot.left, sample.left);
    assert_eq!(snapshot.right, sample.left);

    channel.destroy()
}

#[test]
fn test_attach_before_create_fails() {
    let ns = namespace("missing");
    let err = ChannelHandle::attach(&ns).unwrap_err();
    assert!(err.is_channel_not_found(), "unexpected error: {err}");

    let err = Receiver::attach(&ns).unwrap_err();
    assert!(matches!(err, ShmError::ChannelNotFound { .. }));
}

#[test]
fn test_attach_after_destroy_fails() -> ShmResult<()> {
    let ns = namespace("destroyed");
    let sample = RgbImage::zeroed(Resolution::new(4, 4));
    let channel = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0)?;
    channel.destroy()?;

    assert!(ChannelHandle::attach(&ns).unwrap_err().is_channel_not_found());
    Ok(())
}

#[test]
fn test_double_create_rejected() -> ShmResult<()> {
    let ns = namespace("double");
    let sample = RgbImage::zeroed(Resolution::new(4, 4));
    let first = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0)?;

    let second = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0);
    assert!(matches!(second, Err(ShmError::AlreadyExists { .. })));

    // The failed attempt must not have removed the live channel.
    assert!(all_segments_exist(&ns));
    ChannelHandle::attach(&ns)?.detach();

    first.destroy()?;
    assert!(no_segments_exist(&ns));
    Ok(())
}

#[test]
fn test_partial_create_is_rolled_back() -> ShmResult<()> {
    let ns = namespace("partial");
    // Occupy one name in the middle of the creation order.
    let blocker = stereocast_shared_memory::SharedSegment::create(
        &ChannelField::Fps.segment_name(&ns),
        8,
    )?;

    let sample = RgbImage::zeroed(Resolution::new(4, 4));
    let result = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0);
    assert!(matches!(result, Err(ShmError::AlreadyExists { .. })));

    for field in [
        ChannelField::RgbLeft,
        ChannelField::RgbRight,
        ChannelField::Timestamp,
        ChannelField::Intrinsics,
    ] {
        assert!(
            !Path::new(&segment_file(&ns, field)).exists(),
            "{field} left behind"
        );
    }
    assert!(Path::new(&segment_file(&ns, ChannelField::Fps)).exists());

    stereocast_shared_memory::SharedSegment::unlink(blocker.name())?;
    Ok(())
}

#[test]
fn test_drop_unlinks_segments() -> ShmResult<()> {
    let ns = namespace("drop");
    let sample = RgbImage::zeroed(Resolution::new(4, 4));
    {
        let _channel = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0)?;
        assert!(all_segments_exist(&ns));
    }
    assert!(no_segments_exist(&ns));
    Ok(())
}

#[test]
fn test_wrong_frame_size_rejected() -> ShmResult<()> {
    let ns = namespace("wrong_size");
    let sample = RgbImage::zeroed(Resolution::new(8, 8));
    let channel = Channel::create(&ns, &sample, &Intrinsics::default(), 15.0)?;

    let small = RgbImage::zeroed(Resolution::new(4, 4));
    let pair = FramePair::new(small.clone(), small)?;
    let result = channel.write_frame(&pair, AdmissionPolicy::Exclusive, Duration::ZERO);
    assert!(matches!(result, Err(ShmError::InvalidFrame { .. })));
    // The guard was released despite the error.
    assert!(!channel.lock().is_writing());

    channel.destroy()
}

#[test]
fn test_invalid_namespace() {
    let sample = RgbImage::zeroed(Resolution::new(4, 4));
    let long = "x".repeat(300);
    for bad in ["", "a/b", long.as_str()] {
        let result = Channel::create(bad, &sample, &Intrinsics::default(), 15.0);
        assert!(
            matches!(result, Err(ShmError::InvalidNamespace { .. })),
            "namespace {bad:?} accepted"
        );
    }
}

#[test]
fn test_timestamps_strictly_increase() -> ShmResult<()> {
    let ns = namespace("monotonic");
    let camera = SyntheticCamera::new(4, 4, 30.0);
    let channel = Channel::create(&ns, &camera.expected_pair(0).left, &Intrinsics::default(), 30.0)?;

    let mut previous = channel.timestamp();
    // Back-to-back writes may see an unchanged clock.
    for index in 0..1000 {
        let t = channel.write_frame(&camera.expected_pair(index), AdmissionPolicy::Exclusive, Duration::ZERO)?;
        assert!(t > previous, "timestamp {t} after {previous}");
        previous = t;
    }

    channel.destroy()
}
