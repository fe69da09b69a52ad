// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Connection lifecycle shared by capture and render streams.
//!
//! A stream moves `Disconnected -> Connecting -> Ready -> (Corked <-> Uncorked)`
//! and back to `Disconnected`. All of its mutable state lives in a
//! [`MainloopCell`] and changes only under the audio system's mainloop lock.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    Error, GainControl, GainMode, Result, StreamSpec,
    backend::{BufferAttr, Direction, NativeState, NativeStream, StreamFlags},
    gain::apply_gain,
    mainloop::{MainloopCell, MainloopGuard},
    ring::RingBuffer,
    system::SystemContext,
};

/// Lifecycle state of a capture or render stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    /// Connected and corked, never started.
    Ready,
    Corked,
    Uncorked,
}

impl StreamState {
    /// `true` unless data is flowing.
    pub fn is_corked(self) -> bool {
        self != StreamState::Uncorked
    }
}

/// Handler run on the mainloop when the native stream requests attention.
pub(crate) type RequestHandler = fn(&StreamShared, &mut MainloopGuard<'_>, usize);

/// State guarded by the mainloop lock.
pub(crate) struct StreamCore {
    pub(crate) native: Option<Box<dyn NativeStream>>,
    pub(crate) state: StreamState,
    pub(crate) ring: Option<RingBuffer>,
    pub(crate) gain: GainControl,
    gain_mode: GainMode,
    applied_factor: Option<f64>,
    /// Gain is applied here for render so the caller's bytes stay untouched.
    pub(crate) scratch: Vec<u8>,
}

impl StreamCore {
    /// Applies the attached gain to `data` or pushes it to the native volume.
    pub(crate) fn apply_gain(&mut self, data: &mut [u8], spec: &StreamSpec, id: &Uuid) {
        let factor = self.gain.factor();
        match self.gain_mode {
            GainMode::Software => apply_gain(data, spec.format, factor),
            GainMode::Hardware => {
                if self.applied_factor == Some(factor) {
                    return;
                }
                let Some(native) = self.native.as_mut() else {
                    return;
                };
                match native.set_volume(factor) {
                    Ok(()) => self.applied_factor = Some(factor),
                    Err(error) => {
                        warn!(stream = %id, %error, "native volume failed, using software gain");
                        self.gain_mode = GainMode::Software;
                        apply_gain(data, spec.format, factor);
                    }
                }
            }
        }
    }

    pub(crate) fn gain_mode(&self) -> GainMode {
        self.gain_mode
    }
}

/// Everything a stream and its native callbacks share.
pub(crate) struct StreamShared {
    pub(crate) id: Uuid,
    pub(crate) direction: Direction,
    pub(crate) spec: StreamSpec,
    pub(crate) system: Arc<SystemContext>,
    /// Set from the state callback, which may run inside native calls and
    /// therefore cannot borrow the core.
    pub(crate) failed: AtomicBool,
    pub(crate) core: MainloopCell<StreamCore>,
}

impl StreamShared {
    pub(crate) fn new(
        system: Arc<SystemContext>,
        direction: Direction,
        spec: StreamSpec,
        gain: GainControl,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            direction,
            spec,
            system,
            failed: AtomicBool::new(false),
            core: MainloopCell::new(StreamCore {
                native: None,
                state: StreamState::Disconnected,
                ring: None,
                gain,
                gain_mode: GainMode::Software,
                applied_factor: None,
                scratch: Vec::new(),
            }),
        })
    }

    pub(crate) fn lock(&self) -> MainloopGuard<'_> {
        MainloopGuard::lock(self.system.backend.mainloop())
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> StreamState {
        let mut guard = self.lock();
        self.core.get_mut(&mut guard).state
    }

    fn native_name(&self) -> String {
        let kind = match self.direction {
            Direction::Capture => "capture",
            Direction::Render => "render",
        };
        format!("mediacore-{kind}-{}", self.id)
    }

    fn buffer_attr(&self) -> BufferAttr {
        let fragment = u32::try_from(self.spec.fragment_size()).unwrap_or(u32::MAX);
        match self.direction {
            Direction::Capture => BufferAttr {
                fragsize: Some(fragment),
                ..Default::default()
            },
            Direction::Render => BufferAttr {
                tlength: Some(fragment),
                ..Default::default()
            },
        }
    }

    /// Connects the native stream and blocks until it is ready.
    ///
    /// `on_request` runs on the mainloop for every read or write request once
    /// the stream is ready. Connecting an already connected stream is a no-op.
    pub(crate) fn connect(self: &Arc<Self>, on_request: RequestHandler) -> Result<()> {
        let mut guard = self.lock();
        loop {
            let core = self.core.get_mut(&mut guard);
            match core.state {
                StreamState::Connecting => {}
                StreamState::Disconnected => {
                    core.state = StreamState::Connecting;
                    break;
                }
                _ => return Ok(()),
            }
            guard.wait();
        }

        let result = self.connect_native(&mut guard, on_request);
        let core = self.core.get_mut(&mut guard);
        match result {
            Ok(native) => {
                core.native = Some(native);
                core.state = StreamState::Ready;
                if self.direction == Direction::Capture {
                    core.ring = Some(RingBuffer::new(self.spec.ring_capacity()));
                }
                core.gain_mode = self.system.gain_mode();
                core.applied_factor = None;
                if core.gain_mode == GainMode::Hardware {
                    // Pushes the initial volume, or falls back to software gain.
                    core.apply_gain(&mut [], &self.spec, &self.id);
                }
                debug!(
                    stream = %self.id,
                    direction = ?self.direction,
                    gain_mode = ?core.gain_mode,
                    fragment_size = self.spec.fragment_size(),
                    "stream ready"
                );
                guard.signal();
                Ok(())
            }
            Err(error) => {
                core.state = StreamState::Disconnected;
                guard.signal();
                Err(error)
            }
        }
    }

    fn connect_native(
        self: &Arc<Self>,
        guard: &mut MainloopGuard<'_>,
        on_request: RequestHandler,
    ) -> Result<Box<dyn NativeStream>> {
        self.failed.store(false, Ordering::Release);

        let mut native = self
            .system
            .backend
            .create_stream(&self.spec, self.direction, &self.native_name())
            .map_err(|error| Error::ResourceUnavailable(error.to_string()))?;

        let weak = Arc::downgrade(self);
        native.set_state_callback(Some(Box::new(move |state: NativeState| {
            if let Some(shared) = weak.upgrade() {
                if state.is_terminal() {
                    shared.failed.store(true, Ordering::Release);
                }
                shared.system.backend.mainloop().signal();
            }
        })));

        let flags = StreamFlags {
            start_corked: true,
            adjust_latency: true,
        };
        native
            .connect(self.spec.device.as_deref(), &self.buffer_attr(), flags)
            .map_err(|error| Error::ResourceUnavailable(error.to_string()))?;

        loop {
            match native.state() {
                NativeState::Ready => break,
                state if state.is_terminal() => {
                    return Err(Error::ResourceUnavailable(format!(
                        "stream {} entered state {state:?} while connecting",
                        self.id
                    )));
                }
                _ => guard.wait(),
            }
        }
        self.failed.store(false, Ordering::Release);

        let weak: Weak<StreamShared> = Arc::downgrade(self);
        native.set_request_callback(Some(Box::new(move |nbytes| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            // Safety: request callbacks only run from the mainloop with the
            // lock held, never synchronously inside a native call.
            let mainloop = shared.system.backend.mainloop();
            let mut guard = unsafe { MainloopGuard::assume_locked(mainloop) };
            on_request(&shared, &mut guard, nbytes);
        })));

        Ok(native)
    }

    /// Corks or uncorks a connected stream and wakes blocked callers.
    pub(crate) fn set_corked(&self, corked: bool) -> Result<()> {
        let mut guard = self.lock();
        let core = self.core.get_mut(&mut guard);
        let Some(native) = core.native.as_mut() else {
            return if corked {
                Ok(())
            } else {
                Err(Error::NotConnected)
            };
        };
        if core.state.is_corked() != corked {
            native.cork(corked)?;
        }
        core.state = if corked {
            StreamState::Corked
        } else {
            StreamState::Uncorked
        };
        debug!(stream = %self.id, corked, "cork state changed");
        guard.signal();
        Ok(())
    }

    /// Connects if needed, then uncorks.
    pub(crate) fn start(self: &Arc<Self>, on_request: RequestHandler) -> Result<()> {
        self.connect(on_request)?;
        self.set_corked(false)
    }

    /// Corks, releases the native stream and drops all buffered data.
    pub(crate) fn disconnect(&self) -> Result<()> {
        let mut guard = self.lock();
        let core = self.core.get_mut(&mut guard);
        let Some(mut native) = core.native.take() else {
            return Ok(());
        };

        if !core.state.is_corked() {
            if let Err(error) = native.cork(true) {
                warn!(stream = %self.id, %error, "failed to cork before disconnect");
            }
        }
        core.state = StreamState::Disconnected;
        core.ring = None;
        core.applied_factor = None;
        core.scratch = Vec::new();

        native.set_request_callback(None);
        native.set_state_callback(None);
        let result = native.disconnect();
        drop(native);

        debug!(stream = %self.id, "stream disconnected");
        guard.signal();
        result
    }

    pub(crate) fn gain_control(&self) -> GainControl {
        let mut guard = self.lock();
        self.core.get_mut(&mut guard).gain.clone()
    }

    pub(crate) fn set_gain_control(&self, gain: GainControl) {
        let mut guard = self.lock();
        let core = self.core.get_mut(&mut guard);
        core.gain = gain;
        core.applied_factor = None;
    }

    /// Effective gain mode; software until connected.
    pub(crate) fn gain_mode(&self) -> GainMode {
        let mut guard = self.lock();
        self.core.get_mut(&mut guard).gain_mode()
    }
}
