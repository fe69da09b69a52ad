// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Render streams: pushing PCM to a sink within its writable capacity.

use std::sync::Arc;

use tracing::{trace, warn};
use uuid::Uuid;

use crate::{
    Error, GainControl, GainMode, Result, StreamSpec,
    mainloop::MainloopGuard,
    stream::{StreamShared, StreamState},
};

/// Whether [`RenderStream::process`] took the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Every byte was written.
    Processed,
    /// Some or all bytes remain; call again with the rest.
    NotConsumed,
}

/// Result of a [`RenderStream::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Bytes taken from the front of the buffer.
    pub consumed: usize,
    pub status: RenderStatus,
}

impl RenderOutcome {
    fn nothing() -> Self {
        Self {
            consumed: 0,
            status: RenderStatus::NotConsumed,
        }
    }
}

/// Wakes a producer waiting for capacity. Runs on the mainloop.
fn on_writable(_shared: &StreamShared, guard: &mut MainloopGuard<'_>, _writable: usize) {
    guard.signal();
}

/// A speaker stream.
///
/// Backpressure is explicit: when the sink has no room, [`RenderStream::process`]
/// waits once and reports that nothing was consumed so the caller retries with
/// the same bytes. Render data is never dropped silently.
///
/// Dropping the stream disconnects it.
pub struct RenderStream {
    shared: Arc<StreamShared>,
}

impl RenderStream {
    pub(crate) fn new(shared: Arc<StreamShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.shared.spec
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Opens the native playback stream, corked, and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceUnavailable`] if the backend refuses or fails the
    /// stream.
    pub fn connect(&self) -> Result<()> {
        self.shared.connect(on_writable)
    }

    /// Connects if needed and starts playback.
    pub fn start(&self) -> Result<()> {
        self.shared.start(on_writable)
    }

    /// Pauses playback.
    pub fn stop(&self) -> Result<()> {
        self.shared.set_corked(true)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.shared.disconnect()
    }

    /// Writes as much of `buffer` as the sink accepts.
    ///
    /// Only whole frames are written. A corked stream consumes nothing and
    /// returns immediately. Native write failures are logged and reported as
    /// nothing consumed.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the stream is not connected
    /// - [`Error::StreamFailed`] if the backend dropped the stream
    /// - [`Error::InvalidArg`] if `buffer` is shorter than one frame
    pub fn process(&self, buffer: &[u8]) -> Result<RenderOutcome> {
        let shared = &*self.shared;
        let frame_size = shared.spec.frame_size();
        let mut guard = shared.lock();

        let core = shared.core.get_mut(&mut guard);
        let Some(native) = core.native.as_ref() else {
            return Err(Error::NotConnected);
        };
        if core.state.is_corked() {
            return Ok(RenderOutcome::nothing());
        }
        if shared.has_failed() {
            return Err(Error::StreamFailed);
        }
        if buffer.is_empty() {
            return Ok(RenderOutcome {
                consumed: 0,
                status: RenderStatus::Processed,
            });
        }

        let writable = native.writable_size();
        if writable < frame_size {
            trace!(stream = %shared.id, writable, "render sink full, waiting");
            guard.wait();
            return Ok(RenderOutcome::nothing());
        }
        let length = buffer.len().min(writable);
        let length = length - length % frame_size;
        if length == 0 {
            return Err(Error::InvalidArg(format!(
                "{} bytes do not hold a whole frame",
                buffer.len()
            )));
        }

        let mut scratch = std::mem::take(&mut core.scratch);
        scratch.clear();
        scratch.extend_from_slice(&buffer[..length]);
        core.apply_gain(&mut scratch, &shared.spec, &shared.id);

        let written = core
            .native
            .as_mut()
            .map(|native| native.write(&scratch))
            .unwrap_or(Err(Error::NotConnected));
        core.scratch = scratch;

        match written {
            Ok(consumed) => {
                trace!(stream = %shared.id, consumed, writable, "rendered");
                let status = if consumed == buffer.len() {
                    RenderStatus::Processed
                } else {
                    RenderStatus::NotConsumed
                };
                Ok(RenderOutcome { consumed, status })
            }
            Err(error) => {
                warn!(stream = %shared.id, %error, "native write failed");
                Ok(RenderOutcome::nothing())
            }
        }
    }

    /// Sets the gain level in percent, `0.0..=100.0`.
    pub fn set_gain_level(&self, level: f32) {
        self.shared.gain_control().set_level(level);
    }

    pub fn gain_control(&self) -> GainControl {
        self.shared.gain_control()
    }

    pub fn set_gain_control(&self, gain: GainControl) {
        self.shared.set_gain_control(gain);
    }

    pub fn gain_mode(&self) -> GainMode {
        self.shared.gain_mode()
    }
}

impl Drop for RenderStream {
    fn drop(&mut self) {
        if let Err(error) = self.shared.disconnect() {
            tracing::error!("Failed to disconnect render stream: {:?}", error);
        }
    }
}
