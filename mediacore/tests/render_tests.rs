// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for render streams against the simulated backend.
//!
//! # Test Coverage
//!
//! - Writes bounded by the sink's writable capacity
//! - Backpressure: waiting once and reporting nothing consumed
//! - Cork semantics and lifecycle errors
//! - Writers blocked on a full sink are released by stop and disconnect
//! - Gain applied to rendered audio without touching the caller's buffer

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use mediacore::{
    AudioSystem, ConnectBehavior, Error, GainMode, NativeState, RenderOutcome, RenderStatus,
    RenderStream, SimulatedBackend, SimulatedDriver, SimulatedStreamHandle, StreamConfig,
    StreamState,
};

const WAIT: Duration = Duration::from_secs(2);

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn setup_test(version: Option<&str>) -> (AudioSystem, SimulatedDriver) {
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

fn narrowband() -> StreamConfig {
    StreamConfig::default()
        .with_sample_rate(8_000)
        .with_channels(1)
        .with_bits_per_sample(16)
}

fn started_render(
    system: &AudioSystem,
    driver: &SimulatedDriver,
) -> (RenderStream, SimulatedStreamHandle) {
    let render = system.create_render_stream(&narrowband()).unwrap();
    render.start().unwrap();
    let native = driver.last_stream().unwrap();
    (render, native)
}

fn nothing() -> RenderOutcome {
    RenderOutcome {
        consumed: 0,
        status: RenderStatus::NotConsumed,
    }
}

#[test]
fn whole_buffer_is_written_when_capacity_allows() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    native.set_writable(1000);

    let data: Vec<u8> = (0..320).map(|i| i as u8).collect();
    let outcome = render.process(&data).unwrap();
    assert_eq!(
        outcome,
        RenderOutcome {
            consumed: 320,
            status: RenderStatus::Processed,
        }
    );
    assert_eq!(native.rendered(), data);
    assert_eq!(native.writable(), 680);
}

#[test]
fn partial_write_reports_consumed_whole_frames() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    let data: Vec<u8> = (0..320).map(|i| i as u8).collect();

    native.set_writable(101);
    let outcome = render.process(&data).unwrap();
    assert_eq!(outcome.consumed, 100);
    assert_eq!(outcome.status, RenderStatus::NotConsumed);

    native.set_writable(1000);
    let outcome = render.process(&data[outcome.consumed..]).unwrap();
    assert_eq!(outcome.consumed, 220);
    assert_eq!(outcome.status, RenderStatus::Processed);
    assert_eq!(native.rendered(), data);
}

#[test]
fn full_sink_waits_then_asks_for_a_retry() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    let data = vec![4u8; 320];

    let filler = {
        let native = native.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            native.set_writable(640);
        })
    };

    let mut consumed = 0;
    let mut attempts = 0;
    while consumed < data.len() {
        let outcome = render.process(&data[consumed..]).unwrap();
        if outcome.consumed == 0 {
            assert_eq!(outcome, nothing());
        }
        consumed += outcome.consumed;
        attempts += 1;
        assert!(attempts <= 3, "render never made progress");
    }
    filler.join().unwrap();

    assert!(attempts >= 2);
    assert_eq!(native.rendered(), data);
}

/// Starts a `process` call on another thread against a sink with no room and
/// checks that it is still blocked.
fn blocked_writer(
    render: &Arc<RenderStream>,
) -> (
    mpsc::Receiver<mediacore::Result<RenderOutcome>>,
    thread::JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel();
    let writer = {
        let render = render.clone();
        thread::spawn(move || {
            tx.send(render.process(&[1u8; 64])).unwrap();
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err(), "writer returned without room in the sink");
    (rx, writer)
}

#[test]
fn stop_wakes_a_blocked_writer() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    let render = Arc::new(render);

    let (rx, writer) = blocked_writer(&render);
    render.stop().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), nothing());
    writer.join().unwrap();
    assert!(native.rendered().is_empty());
}

#[test]
fn disconnect_wakes_a_blocked_writer() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    let render = Arc::new(render);

    let (rx, writer) = blocked_writer(&render);
    render.disconnect().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), nothing());
    writer.join().unwrap();
    assert_eq!(native.state(), NativeState::Terminated);
    assert!(native.rendered().is_empty());
}

#[test]
fn corked_stream_consumes_nothing() {
    let (system, driver) = setup_test(None);
    let render = system.create_render_stream(&narrowband()).unwrap();
    render.connect().unwrap();
    let native = driver.last_stream().unwrap();
    native.set_writable(1000);

    assert_eq!(render.process(&[1u8; 64]).unwrap(), nothing());
    assert!(native.rendered().is_empty());

    render.start().unwrap();
    render.stop().unwrap();
    assert_eq!(render.state(), StreamState::Corked);
    assert_eq!(render.process(&[1u8; 64]).unwrap(), nothing());
    assert!(native.rendered().is_empty());
}

#[test]
fn connect_requests_target_length() {
    let (system, driver) = setup_test(None);
    let render = system.create_render_stream(&narrowband()).unwrap();
    render.connect().unwrap();

    let native = driver.last_stream().unwrap();
    let attr = native.buffer_attr().unwrap();
    assert_eq!(attr.tlength, Some(320));
    assert_eq!(attr.fragsize, None);
    assert!(native.name().contains("render"));
}

#[test]
fn lifecycle_errors() {
    let (system, driver) = setup_test(None);
    let render = system.create_render_stream(&narrowband()).unwrap();
    assert!(matches!(render.process(&[0u8; 4]), Err(Error::NotConnected)));

    driver.set_connect_behavior(ConnectBehavior::Refuse);
    assert!(matches!(render.start(), Err(Error::ResourceUnavailable(_))));

    driver.set_connect_behavior(ConnectBehavior::Ready);
    render.start().unwrap();
    let native = driver.last_stream().unwrap();
    native.fail();
    assert!(matches!(render.process(&[0u8; 4]), Err(Error::StreamFailed)));

    render.disconnect().unwrap();
    assert_eq!(native.state(), NativeState::Terminated);
    assert!(matches!(render.process(&[0u8; 4]), Err(Error::NotConnected)));
}

#[test]
fn write_failure_consumes_nothing() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    native.set_writable(1000);
    native.set_fail_writes(true);

    assert_eq!(render.process(&[1u8; 64]).unwrap(), nothing());

    native.set_fail_writes(false);
    assert_eq!(render.process(&[1u8; 64]).unwrap().consumed, 64);
}

#[test]
fn software_gain_leaves_caller_buffer_untouched() {
    let (system, driver) = setup_test(None);
    let (render, native) = started_render(&system, &driver);
    assert_eq!(render.gain_mode(), GainMode::Software);
    render.set_gain_level(50.0);
    native.set_writable(1000);

    let data: Vec<u8> = [2000i16, -2000, 3]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    render.process(&data).unwrap();

    let rendered: Vec<i16> = native
        .rendered()
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(rendered, vec![1000, -1000, 2]);
    assert_eq!(&data[..2], &2000i16.to_le_bytes());
}

#[test]
fn hardware_gain_uses_sink_input_volume() {
    let (system, driver) = setup_test(Some("16.1"));
    let (render, native) = started_render(&system, &driver);
    native.set_writable(1000);

    render.gain_control().set_muted(true);
    let data = vec![8u8; 32];
    render.process(&data).unwrap();

    assert_eq!(native.rendered(), data);
    assert_eq!(native.volumes(), vec![1.0, 0.0]);
}

#[test]
fn loopback_applies_capture_gain_once() {
    let (system, driver) = setup_test(None);
    let capture = system
        .create_capture_stream(&narrowband().with_gain(50.0))
        .unwrap();
    capture.start().unwrap();
    let source = driver.last_stream().unwrap();
    let (render, sink) = started_render(&system, &driver);
    sink.set_writable(1000);

    source.deliver(
        &[2000i16, -2000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<u8>>(),
    );
    let mut buffer = [0u8; 320];
    let read = capture.read(&mut buffer).unwrap();
    render.process(&buffer[..read.length]).unwrap();

    let rendered: Vec<i16> = sink
        .rendered()
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(rendered, vec![1000, -1000]);
}
