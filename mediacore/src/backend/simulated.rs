// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-process backend driven from the outside.
//!
//! [`SimulatedBackend`] behaves like a sound server that delivers captured audio
//! and playback capacity only when told to by its [`SimulatedDriver`]. The driver
//! invokes stream callbacks the same way a native mainloop thread does: with the
//! mainloop lock held.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::trace;

use super::{
    Backend, BufferAttr, Direction, Fragment, NativeState, NativeStream, RequestCallback,
    StateCallback, StreamFlags,
};
use crate::{
    Error, Result, StreamSpec,
    mainloop::{Mainloop, MainloopGuard, SoftMainloop},
};

/// How simulated streams respond to `connect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Become READY immediately.
    #[default]
    Ready,
    /// Reject the connect call itself.
    Refuse,
    /// Accept the call, then report FAILED.
    FailAsync,
    /// Stay CREATING until [`SimulatedStreamHandle::make_ready`] or
    /// [`SimulatedStreamHandle::fail`].
    Pending,
}

type SharedStateCallback = Arc<dyn Fn(NativeState) + Send + Sync>;
type SharedRequestCallback = Arc<dyn Fn(usize) + Send + Sync>;

struct SimState {
    name: String,
    direction: Direction,
    state: NativeState,
    corked: bool,
    device: Option<String>,
    attr: Option<BufferAttr>,
    flags: Option<StreamFlags>,
    pending: VecDeque<Vec<u8>>,
    writable: usize,
    rendered: Vec<u8>,
    volumes: Vec<f64>,
    fail_writes: bool,
    on_state: Option<SharedStateCallback>,
    on_request: Option<SharedRequestCallback>,
}

type SimCell = Arc<Mutex<SimState>>;

fn lock_sim(state: &SimCell) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct DriverShared {
    version: Option<String>,
    behavior: Mutex<ConnectBehavior>,
    volume_supported: Mutex<bool>,
    streams: Mutex<Vec<SimCell>>,
}

/// Backend whose streams are fed by a [`SimulatedDriver`].
pub struct SimulatedBackend {
    mainloop: Arc<SoftMainloop>,
    shared: Arc<DriverShared>,
}

impl SimulatedBackend {
    /// Creates a backend reporting `version` as its library version.
    ///
    /// A version with a major number of at least one selects hardware gain.
    pub fn new(version: Option<&str>) -> (Self, SimulatedDriver) {
        let mainloop = Arc::new(SoftMainloop::new());
        let shared = Arc::new(DriverShared {
            version: version.map(str::to_string),
            behavior: Mutex::new(ConnectBehavior::default()),
            volume_supported: Mutex::new(true),
            streams: Mutex::new(Vec::new()),
        });
        let driver = SimulatedDriver {
            mainloop: mainloop.clone(),
            shared: shared.clone(),
        };
        (Self { mainloop, shared }, driver)
    }
}

impl Backend for SimulatedBackend {
    fn mainloop(&self) -> &dyn Mainloop {
        &*self.mainloop
    }

    fn library_version(&self) -> Option<String> {
        self.shared.version.clone()
    }

    fn create_stream(
        &self,
        _spec: &StreamSpec,
        direction: Direction,
        name: &str,
    ) -> Result<Box<dyn NativeStream>> {
        let state = Arc::new(Mutex::new(SimState {
            name: name.to_string(),
            direction,
            state: NativeState::Unconnected,
            corked: false,
            device: None,
            attr: None,
            flags: None,
            pending: VecDeque::new(),
            writable: 0,
            rendered: Vec::new(),
            volumes: Vec::new(),
            fail_writes: false,
            on_state: None,
            on_request: None,
        }));
        let mut streams = self
            .shared
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        streams.retain(|stream| lock_sim(stream).state != NativeState::Terminated);
        streams.push(state.clone());
        drop(streams);

        Ok(Box::new(SimulatedStream {
            state,
            shared: self.shared.clone(),
            current: None,
        }))
    }
}

struct SimulatedStream {
    state: SimCell,
    shared: Arc<DriverShared>,
    current: Option<Vec<u8>>,
}

impl SimulatedStream {
    fn notify_state(&self, new_state: NativeState) {
        let callback = {
            let mut state = lock_sim(&self.state);
            state.state = new_state;
            state.on_state.clone()
        };
        if let Some(callback) = callback {
            callback(new_state);
        }
    }
}

impl NativeStream for SimulatedStream {
    fn connect(
        &mut self,
        device: Option<&str>,
        attr: &BufferAttr,
        flags: StreamFlags,
    ) -> Result<()> {
        let behavior = *self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if behavior == ConnectBehavior::Refuse {
            return Err(Error::Native {
                operation: "pa_stream_connect",
                code: -1,
            });
        }

        {
            let mut state = lock_sim(&self.state);
            state.device = device.map(str::to_string);
            state.attr = Some(*attr);
            state.flags = Some(flags);
            state.corked = flags.start_corked;
        }

        match behavior {
            ConnectBehavior::Ready => self.notify_state(NativeState::Ready),
            ConnectBehavior::FailAsync => self.notify_state(NativeState::Failed),
            _ => self.notify_state(NativeState::Creating),
        }
        Ok(())
    }

    fn state(&self) -> NativeState {
        lock_sim(&self.state).state
    }

    fn set_state_callback(&mut self, callback: Option<StateCallback>) {
        lock_sim(&self.state).on_state = callback.map(Arc::from);
    }

    fn set_request_callback(&mut self, callback: Option<RequestCallback>) {
        lock_sim(&self.state).on_request = callback.map(Arc::from);
    }

    fn peek(&mut self) -> Result<Fragment<'_>> {
        if self.current.is_none() {
            self.current = lock_sim(&self.state).pending.pop_front();
        }
        Ok(match &self.current {
            Some(fragment) => Fragment::Data(fragment.as_slice()),
            None => Fragment::Empty,
        })
    }

    fn discard(&mut self) -> Result<()> {
        match self.current.take() {
            Some(_) => Ok(()),
            None => Err(Error::Native {
                operation: "pa_stream_drop",
                code: -2,
            }),
        }
    }

    fn writable_size(&self) -> usize {
        lock_sim(&self.state).writable
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = lock_sim(&self.state);
        if state.fail_writes {
            return Err(Error::Native {
                operation: "pa_stream_write",
                code: -3,
            });
        }
        let length = data.len().min(state.writable);
        state.rendered.extend_from_slice(&data[..length]);
        state.writable -= length;
        Ok(length)
    }

    fn cork(&mut self, cork: bool) -> Result<()> {
        lock_sim(&self.state).corked = cork;
        Ok(())
    }

    fn set_volume(&mut self, linear: f64) -> Result<()> {
        let supported = *self
            .shared
            .volume_supported
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !supported {
            return Err(Error::Native {
                operation: "pa_context_set_volume",
                code: -4,
            });
        }
        lock_sim(&self.state).volumes.push(linear);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut state = lock_sim(&self.state);
        state.on_state = None;
        state.on_request = None;
        state.state = NativeState::Terminated;
        Ok(())
    }
}

impl Drop for SimulatedStream {
    // Like an unref'd native stream: gone for good, whatever state it reached.
    fn drop(&mut self) {
        let mut state = lock_sim(&self.state);
        state.on_state = None;
        state.on_request = None;
        state.state = NativeState::Terminated;
    }
}

/// Controls a [`SimulatedBackend`] from test or demo code.
#[derive(Clone)]
pub struct SimulatedDriver {
    mainloop: Arc<SoftMainloop>,
    shared: Arc<DriverShared>,
}

impl SimulatedDriver {
    /// Sets how streams connected from now on respond.
    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Makes native volume calls fail, forcing streams back to software gain.
    pub fn set_volume_supported(&self, supported: bool) {
        *self
            .shared
            .volume_supported
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = supported;
    }

    /// Handles of the live streams, oldest first.
    ///
    /// Terminated streams are forgotten when the next stream is created;
    /// handles already held keep working.
    pub fn streams(&self) -> Vec<SimulatedStreamHandle> {
        self.shared
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|state| SimulatedStreamHandle {
                mainloop: self.mainloop.clone(),
                state: state.clone(),
            })
            .collect()
    }

    /// The most recently created stream.
    pub fn last_stream(&self) -> Option<SimulatedStreamHandle> {
        self.streams().pop()
    }
}

/// One simulated native stream.
#[derive(Clone)]
pub struct SimulatedStreamHandle {
    mainloop: Arc<SoftMainloop>,
    state: SimCell,
}

impl SimulatedStreamHandle {
    /// Queues a captured fragment and fires the read callback.
    pub fn deliver(&self, bytes: &[u8]) {
        let _guard = MainloopGuard::lock(&*self.mainloop);
        let callback = {
            let mut state = lock_sim(&self.state);
            state.pending.push_back(bytes.to_vec());
            state.on_request.clone()
        };
        trace!(length = bytes.len(), "simulated capture delivery");
        if let Some(callback) = callback {
            callback(bytes.len());
        }
    }

    /// Sets the writable capacity and fires the write callback.
    pub fn set_writable(&self, writable: usize) {
        let _guard = MainloopGuard::lock(&*self.mainloop);
        let callback = {
            let mut state = lock_sim(&self.state);
            state.writable = writable;
            state.on_request.clone()
        };
        if let Some(callback) = callback {
            callback(writable);
        }
    }

    /// Makes subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        lock_sim(&self.state).fail_writes = fail;
    }

    /// Reports READY for a stream connected with [`ConnectBehavior::Pending`].
    pub fn make_ready(&self) {
        self.transition(NativeState::Ready);
    }

    /// Reports FAILED, as a server would after losing the device.
    pub fn fail(&self) {
        self.transition(NativeState::Failed);
    }

    fn transition(&self, new_state: NativeState) {
        let guard = MainloopGuard::lock(&*self.mainloop);
        let callback = {
            let mut state = lock_sim(&self.state);
            state.state = new_state;
            state.on_state.clone()
        };
        match callback {
            Some(callback) => callback(new_state),
            None => guard.signal(),
        }
    }

    pub fn name(&self) -> String {
        lock_sim(&self.state).name.clone()
    }

    pub fn direction(&self) -> Direction {
        lock_sim(&self.state).direction
    }

    pub fn state(&self) -> NativeState {
        lock_sim(&self.state).state
    }

    pub fn is_corked(&self) -> bool {
        lock_sim(&self.state).corked
    }

    pub fn device(&self) -> Option<String> {
        lock_sim(&self.state).device.clone()
    }

    pub fn buffer_attr(&self) -> Option<BufferAttr> {
        lock_sim(&self.state).attr
    }

    pub fn flags(&self) -> Option<StreamFlags> {
        lock_sim(&self.state).flags
    }

    /// Everything written to the stream so far.
    pub fn rendered(&self) -> Vec<u8> {
        lock_sim(&self.state).rendered.clone()
    }

    /// Linear volumes set on the stream, in order.
    pub fn volumes(&self) -> Vec<f64> {
        lock_sim(&self.state).volumes.clone()
    }

    /// Remaining writable capacity.
    pub fn writable(&self) -> usize {
        lock_sim(&self.state).writable
    }
}
