// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Capture streams: native read callbacks feeding a blocking pull API.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    Error, GainControl, GainMode, Result, StreamSpec,
    backend::Fragment,
    mainloop::MainloopGuard,
    stream::{StreamShared, StreamState},
};

/// Result of a successful [`CaptureStream::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRead {
    /// Bytes copied into the destination buffer.
    pub length: usize,
    /// Wall-clock time of the read, in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Drains the native stream into the ring buffer. Runs on the mainloop.
fn on_readable(shared: &StreamShared, guard: &mut MainloopGuard<'_>, _available: usize) {
    let core = shared.core.get_mut(guard);
    let corked = core.state.is_corked();
    let (Some(native), Some(ring)) = (core.native.as_mut(), core.ring.as_mut()) else {
        return;
    };

    loop {
        let length = match native.peek() {
            Ok(Fragment::Empty) => break,
            Ok(Fragment::Hole(length)) => {
                trace!(stream = %shared.id, length, "skipping capture hole");
                length
            }
            Ok(Fragment::Data(data)) => {
                if !corked {
                    let dropped = ring.push(data);
                    if dropped > 0 {
                        debug!(
                            stream = %shared.id,
                            dropped,
                            "capture buffer overflow, dropped oldest bytes"
                        );
                    }
                }
                data.len()
            }
            Err(error) => {
                warn!(stream = %shared.id, %error, "failed to peek captured data");
                break;
            }
        };
        trace!(stream = %shared.id, length, buffered = ring.len(), "captured fragment");
        if let Err(error) = native.discard() {
            warn!(stream = %shared.id, %error, "failed to drop captured fragment");
            break;
        }
    }

    guard.signal();
}

/// A microphone stream.
///
/// Data arrives on the backend thread and is buffered for up to 100 ms;
/// [`CaptureStream::read`] pulls it out at most one 20 ms fragment at a time.
/// When the consumer falls behind the oldest audio is dropped.
///
/// Dropping the stream disconnects it.
pub struct CaptureStream {
    shared: Arc<StreamShared>,
}

impl CaptureStream {
    pub(crate) fn new(shared: Arc<StreamShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.shared.spec
    }

    /// Largest number of bytes a single read returns.
    pub fn fragment_size(&self) -> usize {
        self.shared.spec.fragment_size()
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state(),
            StreamState::Disconnected | StreamState::Connecting
        )
    }

    /// Opens the native record stream, corked, and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceUnavailable`] if the backend refuses or fails the
    /// stream.
    pub fn connect(&self) -> Result<()> {
        self.shared.connect(on_readable)
    }

    /// Connects if needed and starts capturing.
    pub fn start(&self) -> Result<()> {
        self.shared.start(on_readable)
    }

    /// Pauses capturing; blocked readers return with zero bytes.
    pub fn stop(&self) -> Result<()> {
        self.shared.set_corked(true)
    }

    /// Releases the native stream and discards buffered audio.
    pub fn disconnect(&self) -> Result<()> {
        self.shared.disconnect()
    }

    /// Blocks until captured audio is available and copies it into `buffer`.
    ///
    /// At most one fragment is returned per call. Gain is applied to the copied
    /// bytes. A corked stream returns immediately with zero bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the stream was never connected
    /// - [`Error::StreamFailed`] if the backend dropped the stream
    pub fn read(&self, buffer: &mut [u8]) -> Result<CaptureRead> {
        let shared = &*self.shared;
        let mut guard = shared.lock();
        if shared.core.get_mut(&mut guard).native.is_none() {
            return Err(Error::NotConnected);
        }

        let limit = buffer.len().min(shared.spec.fragment_size());
        let length = loop {
            let core = shared.core.get_mut(&mut guard);
            if core.state.is_corked() || limit == 0 {
                break 0;
            }
            if shared.has_failed() {
                return Err(Error::StreamFailed);
            }
            if let Some(ring) = core.ring.as_mut() {
                if !ring.is_empty() {
                    let length = ring.pop(&mut buffer[..limit]);
                    core.apply_gain(&mut buffer[..length], &shared.spec, &shared.id);
                    break length;
                }
            }
            guard.wait();
        };
        drop(guard);

        trace!(stream = %shared.id, length, "capture read");
        Ok(CaptureRead {
            length,
            timestamp_ns: now_ns(),
        })
    }

    /// Sets the gain level in percent, `0.0..=100.0`.
    pub fn set_gain_level(&self, level: f32) {
        self.shared.gain_control().set_level(level);
    }

    pub fn gain_control(&self) -> GainControl {
        self.shared.gain_control()
    }

    /// Replaces the gain control, e.g. to share one between streams.
    pub fn set_gain_control(&self, gain: GainControl) {
        self.shared.set_gain_control(gain);
    }

    pub fn gain_mode(&self) -> GainMode {
        self.shared.gain_mode()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Err(error) = self.shared.disconnect() {
            tracing::error!("Failed to disconnect capture stream: {:?}", error);
        }
    }
}
