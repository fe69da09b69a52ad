// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for capture streams.
//!
//! Every test runs against the simulated backend, so no sound server is needed.
//! The driver plays the role of the native mainloop thread: it delivers captured
//! fragments and state changes with the mainloop lock held.
//!
//! # Test Coverage
//!
//! - Connect, start, stop and disconnect lifecycle
//! - Ring buffer sizing, fragment-bounded reads and overflow
//! - Cork semantics and wakeups of blocked readers
//! - Software and hardware gain

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use mediacore::{
    AudioSystem, CaptureStream, ConnectBehavior, Error, GainMode, NativeState, SimulatedBackend,
    SimulatedDriver, SimulatedStreamHandle, StreamConfig, StreamState,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

const WAIT: Duration = Duration::from_secs(5);

/// Initializes logging and creates an audio system over a simulated backend
/// reporting `version`.
fn setup_test(version: Option<&str>) -> (AudioSystem, SimulatedDriver) {
    // Initialize logging once (respects RUST_LOG environment variable)
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });

    let (backend, driver) = SimulatedBackend::new(version);
    (AudioSystem::new(backend), driver)
}

/// 8 kHz mono 16-bit: 320-byte fragments, 1600-byte ring.
fn narrowband() -> StreamConfig {
    StreamConfig::default()
        .with_sample_rate(8_000)
        .with_channels(1)
        .with_bits_per_sample(16)
}

fn started_capture(
    system: &AudioSystem,
    driver: &SimulatedDriver,
) -> (CaptureStream, SimulatedStreamHandle) {
    let capture = system.create_capture_stream(&narrowband()).unwrap();
    capture.start().unwrap();
    let native = driver.last_stream().unwrap();
    (capture, native)
}

fn s16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn to_s16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

#[test]
fn delivered_burst_is_read_with_timestamp() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    let burst: Vec<u8> = (0..160).map(|i| i as u8).collect();
    native.deliver(&burst);

    let mut buffer = [0u8; 200];
    let read = capture.read(&mut buffer).unwrap();
    assert_eq!(read.length, 160);
    assert_eq!(&buffer[..160], burst.as_slice());
    assert!(read.timestamp_ns > 0);

    // The ring is drained; the next burst starts from a clean buffer.
    native.deliver(&[7u8; 4]);
    let read = capture.read(&mut buffer).unwrap();
    assert_eq!(read.length, 4);
    assert_eq!(&buffer[..4], &[7u8; 4]);
}

#[test]
fn connect_requests_fragment_sized_buffering() {
    let (system, driver) = setup_test(None);
    let capture = system
        .create_capture_stream(&narrowband().with_device("alsa_input.usb-headset"))
        .unwrap();
    assert_eq!(capture.state(), StreamState::Disconnected);
    assert_eq!(capture.fragment_size(), 320);

    capture.connect().unwrap();
    assert_eq!(capture.state(), StreamState::Ready);
    assert!(capture.is_connected());

    let native = driver.last_stream().unwrap();
    let attr = native.buffer_attr().unwrap();
    assert_eq!(attr.fragsize, Some(320));
    assert_eq!(attr.tlength, None);
    let flags = native.flags().unwrap();
    assert!(flags.start_corked);
    assert!(flags.adjust_latency);
    assert!(native.is_corked());
    assert_eq!(native.device().as_deref(), Some("alsa_input.usb-headset"));
    assert!(native.name().contains(&capture.id().to_string()));

    // Connecting twice keeps the same native stream.
    capture.connect().unwrap();
    assert_eq!(driver.streams().len(), 1);
}

#[test]
fn reads_are_bounded_by_fragment_and_buffer() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    native.deliver(&[1u8; 500]);
    let mut large = [0u8; 1000];
    assert_eq!(capture.read(&mut large).unwrap().length, 320);
    assert_eq!(capture.read(&mut large).unwrap().length, 180);

    native.deliver(&[2u8; 160]);
    let mut small = [0u8; 100];
    assert_eq!(capture.read(&mut small).unwrap().length, 100);
    assert_eq!(capture.read(&mut small).unwrap().length, 60);
}

#[test]
fn overflow_keeps_the_newest_audio() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    let burst: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    native.deliver(&burst);

    let mut collected = Vec::new();
    let mut buffer = [0u8; 320];
    for _ in 0..5 {
        let read = capture.read(&mut buffer).unwrap();
        assert_eq!(read.length, 320);
        collected.extend_from_slice(&buffer[..read.length]);
    }
    assert_eq!(collected.as_slice(), &burst[400..]);

    capture.stop().unwrap();
    assert_eq!(capture.read(&mut buffer).unwrap().length, 0);
}

#[test]
fn corked_stream_returns_immediately_and_drops_input() {
    let (system, driver) = setup_test(None);
    let capture = system.create_capture_stream(&narrowband()).unwrap();
    capture.connect().unwrap();
    let native = driver.last_stream().unwrap();

    let mut buffer = [0u8; 320];
    assert_eq!(capture.read(&mut buffer).unwrap().length, 0);

    // Delivered while corked: discarded, not buffered.
    native.deliver(&[9u8; 160]);
    capture.start().unwrap();
    assert!(!native.is_corked());
    native.deliver(&[3u8; 10]);

    let read = capture.read(&mut buffer).unwrap();
    assert_eq!(read.length, 10);
    assert_eq!(&buffer[..10], &[3u8; 10]);

    capture.stop().unwrap();
    assert!(native.is_corked());
    assert_eq!(capture.state(), StreamState::Corked);
}

#[test]
fn stop_wakes_a_blocked_reader() {
    let (system, driver) = setup_test(None);
    let (capture, _native) = started_capture(&system, &driver);
    let capture = Arc::new(capture);

    let (tx, rx) = mpsc::channel();
    let reader = {
        let capture = capture.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; 320];
            tx.send(capture.read(&mut buffer).map(|read| read.length))
                .unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    capture.stop().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), 0);
    reader.join().unwrap();
}

#[test]
fn delivery_wakes_a_blocked_reader() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);
    let capture = Arc::new(capture);

    let (tx, rx) = mpsc::channel();
    let reader = {
        let capture = capture.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; 320];
            tx.send(capture.read(&mut buffer).map(|read| read.length))
                .unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    native.deliver(&[5u8; 64]);

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), 64);
    reader.join().unwrap();
}

#[test]
fn disconnect_wakes_a_blocked_reader_and_releases_the_stream() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);
    let capture = Arc::new(capture);

    let (tx, rx) = mpsc::channel();
    let reader = {
        let capture = capture.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; 320];
            tx.send(capture.read(&mut buffer).map(|read| read.length))
                .unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    capture.disconnect().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), 0);
    reader.join().unwrap();

    assert_eq!(native.state(), NativeState::Terminated);
    assert_eq!(capture.state(), StreamState::Disconnected);
    assert!(matches!(
        capture.read(&mut [0u8; 16]),
        Err(Error::NotConnected)
    ));
}

#[test]
fn reconnect_starts_with_an_empty_buffer() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    native.deliver(&[1u8; 100]);
    capture.disconnect().unwrap();
    capture.start().unwrap();
    // The terminated stream is no longer tracked by the driver.
    assert_eq!(driver.streams().len(), 1);
    assert_eq!(native.state(), NativeState::Terminated);

    let native = driver.last_stream().unwrap();
    native.deliver(&[2u8; 8]);
    let mut buffer = [0u8; 320];
    let read = capture.read(&mut buffer).unwrap();
    assert_eq!(read.length, 8);
    assert_eq!(&buffer[..8], &[2u8; 8]);
}

#[test]
fn read_before_connect_is_an_error() {
    let (system, _driver) = setup_test(None);
    let capture = system.create_capture_stream(&narrowband()).unwrap();
    assert!(matches!(
        capture.read(&mut [0u8; 16]),
        Err(Error::NotConnected)
    ));
    // Stopping an unconnected stream is harmless.
    capture.stop().unwrap();
}

#[test]
fn refused_and_failed_connects_are_unavailable() {
    let (system, driver) = setup_test(None);
    let capture = system.create_capture_stream(&narrowband()).unwrap();

    driver.set_connect_behavior(ConnectBehavior::Refuse);
    assert!(matches!(
        capture.connect(),
        Err(Error::ResourceUnavailable(_))
    ));
    assert_eq!(capture.state(), StreamState::Disconnected);

    driver.set_connect_behavior(ConnectBehavior::FailAsync);
    assert!(matches!(capture.start(), Err(Error::ResourceUnavailable(_))));
    assert_eq!(capture.state(), StreamState::Disconnected);

    driver.set_connect_behavior(ConnectBehavior::Ready);
    capture.connect().unwrap();
    assert_eq!(capture.state(), StreamState::Ready);
    assert_eq!(driver.streams().len(), 1);
}

#[test]
fn connect_blocks_until_the_backend_is_ready() {
    let (system, driver) = setup_test(None);
    driver.set_connect_behavior(ConnectBehavior::Pending);
    let capture = Arc::new(system.create_capture_stream(&narrowband()).unwrap());

    let (tx, rx) = mpsc::channel();
    let connector = {
        let capture = capture.clone();
        thread::spawn(move || tx.send(capture.connect().is_ok()).unwrap())
    };

    let native = loop {
        if let Some(native) = driver.last_stream() {
            break native;
        }
        thread::sleep(Duration::from_millis(5));
    };
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    native.make_ready();
    assert!(rx.recv_timeout(WAIT).unwrap());
    connector.join().unwrap();
    assert_eq!(capture.state(), StreamState::Ready);
}

#[test]
fn backend_failure_surfaces_on_read() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    native.fail();
    assert!(matches!(
        capture.read(&mut [0u8; 320]),
        Err(Error::StreamFailed)
    ));
}

#[test]
fn software_gain_halves_full_scale_samples() {
    let (system, driver) = setup_test(Some("0.9.22"));
    assert_eq!(system.gain_mode(), GainMode::Software);
    let (capture, native) = started_capture(&system, &driver);
    capture.set_gain_level(50.0);

    native.deliver(&s16(&[i16::MAX, i16::MIN, i16::MAX, 1001]));
    let mut buffer = [0u8; 8];
    let read = capture.read(&mut buffer).unwrap();
    assert_eq!(read.length, 8);
    assert_eq!(to_s16(&buffer), vec![16384, -16384, 16384, 500]);
    assert!(native.volumes().is_empty());
}

#[test]
fn hardware_gain_sets_native_volume_on_change() {
    let (system, driver) = setup_test(Some("15.0.0"));
    assert_eq!(system.gain_mode(), GainMode::Hardware);
    let (capture, native) = started_capture(&system, &driver);
    assert_eq!(capture.gain_mode(), GainMode::Hardware);
    assert_eq!(native.volumes(), vec![1.0]);

    capture.set_gain_level(50.0);
    let samples = s16(&[i16::MAX, i16::MIN]);
    let mut buffer = [0u8; 4];

    native.deliver(&samples);
    capture.read(&mut buffer).unwrap();
    assert_eq!(buffer.as_slice(), samples.as_slice());
    assert_eq!(native.volumes(), vec![1.0, 0.5]);

    // Unchanged level: no further native call.
    native.deliver(&samples);
    capture.read(&mut buffer).unwrap();
    assert_eq!(native.volumes(), vec![1.0, 0.5]);
}

#[test]
fn hardware_gain_falls_back_to_software() {
    let (system, driver) = setup_test(Some("15.0.0"));
    driver.set_volume_supported(false);
    let capture = system
        .create_capture_stream(&narrowband().with_gain(50.0))
        .unwrap();
    capture.start().unwrap();
    assert_eq!(capture.gain_mode(), GainMode::Software);

    let native = driver.last_stream().unwrap();
    native.deliver(&s16(&[1000, -1000]));
    let mut buffer = [0u8; 4];
    capture.read(&mut buffer).unwrap();
    assert_eq!(to_s16(&buffer), vec![500, -500]);
}

#[test]
fn shared_gain_control_applies_to_the_stream() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);

    let control = mediacore::GainControl::new(100.0);
    capture.set_gain_control(control.clone());
    control.set_muted(true);

    native.deliver(&s16(&[1234, -1234]));
    let mut buffer = [0u8; 4];
    capture.read(&mut buffer).unwrap();
    assert_eq!(to_s16(&buffer), vec![0, 0]);
}

#[test]
fn dropping_the_stream_disconnects_it() {
    let (system, driver) = setup_test(None);
    let (capture, native) = started_capture(&system, &driver);
    assert_eq!(native.state(), NativeState::Ready);

    drop(capture);
    assert_eq!(native.state(), NativeState::Terminated);
    assert!(native.is_corked());
}

#[test]
fn config_from_json_resolves_defaults() {
    let (system, _driver) = setup_test(None);
    let config: StreamConfig =
        serde_json::from_str(r#"{"sample_rate": 16000, "media_role": "music"}"#).unwrap();
    let capture = system.create_capture_stream(&config).unwrap();

    let spec = capture.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.media_role, "music");
    assert_eq!(capture.fragment_size(), 640);

    let invalid = StreamConfig::default().with_bits_per_sample(12);
    assert!(matches!(
        system.create_capture_stream(&invalid),
        Err(Error::InvalidArg(_))
    ));
}
