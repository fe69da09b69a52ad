// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Native audio backends.
//!
//! A [`Backend`] owns the mainloop and creates [`NativeStream`]s. Two
//! implementations exist: [`pulse::PulseBackend`] over a dynamically loaded
//! libpulse, and [`simulated::SimulatedBackend`], an in-process stand-in that a
//! [`simulated::SimulatedDriver`] feeds from the outside.
//!
//! Unless stated otherwise every [`NativeStream`] method must be called with the
//! backend's mainloop lock held.

pub mod pulse;
pub mod simulated;

use crate::{Result, StreamSpec, mainloop::Mainloop};

/// Whether a stream records from a source or plays to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Capture,
    Render,
}

/// Connection state reported by the native stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    Unconnected,
    Creating,
    Ready,
    Failed,
    Terminated,
}

impl NativeState {
    /// `true` for states the stream never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, NativeState::Failed | NativeState::Terminated)
    }

    pub(crate) fn from_native(state: pulse_sys::pa_stream_state_t) -> Self {
        match state {
            pulse_sys::PA_STREAM_CREATING => NativeState::Creating,
            pulse_sys::PA_STREAM_READY => NativeState::Ready,
            pulse_sys::PA_STREAM_FAILED => NativeState::Failed,
            pulse_sys::PA_STREAM_TERMINATED => NativeState::Terminated,
            _ => NativeState::Unconnected,
        }
    }
}

/// Requested server-side buffering; `None` lets the server choose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferAttr {
    pub maxlength: Option<u32>,
    pub tlength: Option<u32>,
    pub prebuf: Option<u32>,
    pub minreq: Option<u32>,
    pub fragsize: Option<u32>,
}

impl BufferAttr {
    pub(crate) fn to_native(self) -> pulse_sys::pa_buffer_attr {
        let or_default = |value: Option<u32>| value.unwrap_or(u32::MAX);
        pulse_sys::pa_buffer_attr {
            maxlength: or_default(self.maxlength),
            tlength: or_default(self.tlength),
            prebuf: or_default(self.prebuf),
            minreq: or_default(self.minreq),
            fragsize: or_default(self.fragsize),
        }
    }
}

/// Connection flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub start_corked: bool,
    pub adjust_latency: bool,
}

impl StreamFlags {
    pub(crate) fn to_native(self) -> pulse_sys::pa_stream_flags_t {
        let mut flags = pulse_sys::PA_STREAM_NOFLAGS;
        if self.start_corked {
            flags |= pulse_sys::PA_STREAM_START_CORKED;
        }
        if self.adjust_latency {
            flags |= pulse_sys::PA_STREAM_ADJUST_LATENCY;
        }
        flags
    }
}

/// A chunk returned by [`NativeStream::peek`].
#[derive(Debug, PartialEq, Eq)]
pub enum Fragment<'a> {
    /// Nothing buffered.
    Empty,
    /// A gap in the recording of the given length; must still be discarded.
    Hole(usize),
    Data(&'a [u8]),
}

/// Invoked from the mainloop, lock held, whenever the native state changes.
///
/// Native calls may invoke it synchronously, so it must not borrow any
/// [`crate::mainloop::MainloopCell`].
pub type StateCallback = Box<dyn Fn(NativeState) + Send + Sync>;

/// Invoked from the mainloop, lock held, when data can be read (capture) or
/// written (render). The argument is the number of bytes available.
pub type RequestCallback = Box<dyn Fn(usize) + Send + Sync>;

/// A native audio backend.
pub trait Backend: Send + Sync {
    /// The lock shared by every stream of this backend.
    fn mainloop(&self) -> &dyn Mainloop;

    /// Version string of the native library, `"major.minor.micro"`.
    fn library_version(&self) -> Option<String>;

    /// Creates an unconnected stream. Requires the mainloop lock.
    fn create_stream(
        &self,
        spec: &StreamSpec,
        direction: Direction,
        name: &str,
    ) -> Result<Box<dyn NativeStream>>;
}

/// A native record or playback stream.
pub trait NativeStream: Send {
    /// Starts connecting to `device`, or the server default when `None`.
    ///
    /// Completion is reported through the state callback.
    fn connect(
        &mut self,
        device: Option<&str>,
        attr: &BufferAttr,
        flags: StreamFlags,
    ) -> Result<()>;

    fn state(&self) -> NativeState;

    fn set_state_callback(&mut self, callback: Option<StateCallback>);

    fn set_request_callback(&mut self, callback: Option<RequestCallback>);

    /// Returns the next captured fragment without consuming it.
    fn peek(&mut self) -> Result<Fragment<'_>>;

    /// Drops the fragment returned by the last non-empty [`NativeStream::peek`].
    fn discard(&mut self) -> Result<()>;

    fn writable_size(&self) -> usize;

    /// Queues `data` for playback and returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    fn cork(&mut self, cork: bool) -> Result<()>;

    /// Sets the mixer volume of this stream to a linear factor.
    fn set_volume(&mut self, linear: f64) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;
}
