// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! PulseAudio backend over the threaded mainloop API.

use std::{
    ffi::{CStr, CString, c_void},
    os::raw::{c_int, c_uint},
    ptr,
};

use tracing::{debug, warn};

use super::{
    Backend, BufferAttr, Direction, Fragment, NativeState, NativeStream, RequestCallback,
    StateCallback, StreamFlags,
};
use crate::{
    Error, Result, StreamSpec,
    api::PulseApiHandle,
    mainloop::{Mainloop, MainloopGuard},
};

/// The libpulse threaded mainloop.
struct PulseMainloop {
    api: PulseApiHandle,
    raw: *mut pulse_sys::pa_threaded_mainloop,
}

// Safety: the threaded mainloop functions may be called from any thread; the
// lock itself is what serializes access to the objects it drives.
unsafe impl Send for PulseMainloop {}
unsafe impl Sync for PulseMainloop {}

unsafe impl Mainloop for PulseMainloop {
    fn lock(&self) {
        unsafe { self.api.pa_threaded_mainloop_lock(self.raw) }
    }

    unsafe fn unlock(&self) {
        unsafe { self.api.pa_threaded_mainloop_unlock(self.raw) }
    }

    unsafe fn wait(&self) {
        unsafe { self.api.pa_threaded_mainloop_wait(self.raw) }
    }

    fn signal(&self) {
        unsafe { self.api.pa_threaded_mainloop_signal(self.raw, 0) }
    }
}

impl Drop for PulseMainloop {
    fn drop(&mut self) {
        unsafe {
            self.api.pa_threaded_mainloop_stop(self.raw);
            self.api.pa_threaded_mainloop_free(self.raw);
        }
    }
}

unsafe extern "C" fn context_state_trampoline(
    _context: *mut pulse_sys::pa_context,
    userdata: *mut c_void,
) {
    let mainloop = unsafe { &*(userdata as *const PulseMainloop) };
    mainloop.signal();
}

fn strerror(api: &PulseApiHandle, code: c_int) -> String {
    let message = unsafe { api.pa_strerror(code) };
    if message.is_null() {
        format!("error {code}")
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

fn context_error(
    api: &PulseApiHandle,
    context: *mut pulse_sys::pa_context,
    operation: &'static str,
) -> Error {
    let code = unsafe { api.pa_context_errno(context) };
    warn!(operation, code, message = %strerror(api, code), "libpulse call failed");
    Error::Native { operation, code }
}

fn set_proplist_entry(
    api: &PulseApiHandle,
    proplist: *mut pulse_sys::pa_proplist,
    key: &[u8],
    value: &CStr,
) {
    if !proplist.is_null() {
        unsafe { api.pa_proplist_sets(proplist, key.as_ptr().cast(), value.as_ptr()) };
    }
}

/// Audio backend connected to a PulseAudio server.
///
/// Owns one threaded mainloop and one context; every stream it creates shares
/// that mainloop's lock.
///
/// ```no_run
/// use mediacore::{PulseBackend, config::default_library_path, load_api};
///
/// # fn main() -> Result<(), mediacore::Error> {
/// let api = load_api(default_library_path())?;
/// let backend = PulseBackend::new(api, "softphone")?;
/// # Ok(())
/// # }
/// ```
pub struct PulseBackend {
    context: *mut pulse_sys::pa_context,
    // Boxed so the context state callback can hold a stable pointer.
    mainloop: Box<PulseMainloop>,
}

// Safety: the context is only touched with the mainloop lock held.
unsafe impl Send for PulseBackend {}
unsafe impl Sync for PulseBackend {}

impl PulseBackend {
    /// Starts a threaded mainloop and blocks until the context is ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceUnavailable`] when no server is reachable.
    pub fn new(api: PulseApiHandle, app_name: &str) -> Result<Self> {
        let app_name = CString::new(app_name)?;

        let raw = unsafe { api.pa_threaded_mainloop_new() };
        if raw.is_null() {
            return Err(Error::ResourceUnavailable(
                "Failed to create threaded mainloop.".to_string(),
            ));
        }
        let mainloop = Box::new(PulseMainloop {
            api: api.clone(),
            raw,
        });

        let context = unsafe {
            let proplist = api.pa_proplist_new();
            set_proplist_entry(
                &api,
                proplist,
                pulse_sys::PA_PROP_APPLICATION_NAME,
                &app_name,
            );
            let context = api.pa_context_new_with_proplist(
                api.pa_threaded_mainloop_get_api(raw),
                app_name.as_ptr(),
                proplist,
            );
            if !proplist.is_null() {
                api.pa_proplist_free(proplist);
            }
            context
        };
        if context.is_null() {
            return Err(Error::ResourceUnavailable(
                "Failed to create PulseAudio context.".to_string(),
            ));
        }

        let backend = Self { context, mainloop };
        let userdata = &*backend.mainloop as *const PulseMainloop as *mut c_void;
        unsafe {
            api.pa_context_set_state_callback(context, Some(context_state_trampoline), userdata)
        };

        Error::from_status("pa_threaded_mainloop_start", unsafe {
            api.pa_threaded_mainloop_start(raw)
        })?;

        let mut guard = MainloopGuard::lock(&*backend.mainloop);
        let status = unsafe {
            api.pa_context_connect(
                context,
                ptr::null(),
                pulse_sys::PA_CONTEXT_NOFLAGS,
                ptr::null(),
            )
        };
        if status < 0 {
            let error = context_error(&api, context, "pa_context_connect");
            return Err(Error::ResourceUnavailable(error.to_string()));
        }

        loop {
            let state = unsafe { api.pa_context_get_state(context) };
            if state == pulse_sys::PA_CONTEXT_READY {
                break;
            }
            if !pulse_sys::pa_context_is_good(state) {
                let error = context_error(&api, context, "pa_context_connect");
                return Err(Error::ResourceUnavailable(error.to_string()));
            }
            guard.wait();
        }
        drop(guard);

        debug!(version = ?backend.library_version(), "PulseAudio context ready");
        Ok(backend)
    }

    fn api(&self) -> &PulseApiHandle {
        &self.mainloop.api
    }
}

impl Drop for PulseBackend {
    fn drop(&mut self) {
        let api = self.mainloop.api.clone();
        let _guard = MainloopGuard::lock(&*self.mainloop);
        unsafe {
            api.pa_context_set_state_callback(self.context, None, ptr::null_mut());
            api.pa_context_disconnect(self.context);
            api.pa_context_unref(self.context);
        }
    }
}

impl Backend for PulseBackend {
    fn mainloop(&self) -> &dyn Mainloop {
        &*self.mainloop
    }

    fn library_version(&self) -> Option<String> {
        let version = unsafe { self.api().pa_get_library_version() };
        if version.is_null() {
            return None;
        }
        unsafe { CStr::from_ptr(version) }
            .to_str()
            .ok()
            .map(str::to_string)
    }

    fn create_stream(
        &self,
        spec: &StreamSpec,
        direction: Direction,
        name: &str,
    ) -> Result<Box<dyn NativeStream>> {
        let api = self.api();
        let name = CString::new(name)?;
        let role = CString::new(spec.media_role.as_str())?;
        let sample_spec = spec.to_native();

        let stream = unsafe {
            let proplist = api.pa_proplist_new();
            set_proplist_entry(api, proplist, pulse_sys::PA_PROP_MEDIA_ROLE, &role);
            let stream = api.pa_stream_new_with_proplist(
                self.context,
                name.as_ptr(),
                &sample_spec,
                ptr::null(),
                proplist,
            );
            if !proplist.is_null() {
                api.pa_proplist_free(proplist);
            }
            stream
        };
        if stream.is_null() {
            let error = context_error(api, self.context, "pa_stream_new_with_proplist");
            return Err(Error::ResourceUnavailable(error.to_string()));
        }

        Ok(Box::new(PulseStream {
            api: api.clone(),
            context: self.context,
            stream,
            direction,
            channels: spec.channels,
            state_slot: ptr::null_mut(),
            request_slot: ptr::null_mut(),
            disconnected: false,
        }))
    }
}

struct StateSlot {
    api: PulseApiHandle,
    callback: StateCallback,
}

unsafe extern "C" fn stream_state_trampoline(
    stream: *mut pulse_sys::pa_stream,
    userdata: *mut c_void,
) {
    let slot = unsafe { &*(userdata as *const StateSlot) };
    let state = NativeState::from_native(unsafe { slot.api.pa_stream_get_state(stream) });
    (slot.callback)(state);
}

unsafe extern "C" fn stream_request_trampoline(
    _stream: *mut pulse_sys::pa_stream,
    nbytes: usize,
    userdata: *mut c_void,
) {
    let callback = unsafe { &*(userdata as *const RequestCallback) };
    callback(nbytes);
}

/// A libpulse record or playback stream.
///
/// Callbacks are stored as raw boxed pointers handed to libpulse as userdata
/// and freed once libpulse no longer references them.
struct PulseStream {
    api: PulseApiHandle,
    context: *mut pulse_sys::pa_context,
    stream: *mut pulse_sys::pa_stream,
    direction: Direction,
    channels: u8,
    state_slot: *mut StateSlot,
    request_slot: *mut RequestCallback,
    disconnected: bool,
}

// Safety: the stream is only used with the mainloop lock held, and the
// callback slots are only freed after libpulse has been told to forget them.
unsafe impl Send for PulseStream {}

impl PulseStream {
    fn clear_state_callback(&mut self) {
        unsafe {
            self.api
                .pa_stream_set_state_callback(self.stream, None, ptr::null_mut())
        };
        if !self.state_slot.is_null() {
            drop(unsafe { Box::from_raw(self.state_slot) });
            self.state_slot = ptr::null_mut();
        }
    }

    fn install_request_trampoline(
        &self,
        callback: pulse_sys::pa_stream_request_cb_t,
        userdata: *mut c_void,
    ) {
        unsafe {
            match self.direction {
                Direction::Capture => {
                    self.api
                        .pa_stream_set_read_callback(self.stream, callback, userdata)
                }
                Direction::Render => {
                    self.api
                        .pa_stream_set_write_callback(self.stream, callback, userdata)
                }
            }
        }
    }

    fn is_good(&self) -> bool {
        pulse_sys::pa_stream_is_good(unsafe { self.api.pa_stream_get_state(self.stream) })
    }
}

impl NativeStream for PulseStream {
    fn connect(
        &mut self,
        device: Option<&str>,
        attr: &BufferAttr,
        flags: StreamFlags,
    ) -> Result<()> {
        let device = device.map(CString::new).transpose()?;
        let device_ptr = device.as_ref().map_or(ptr::null(), |device| device.as_ptr());
        let attr = attr.to_native();

        let status = unsafe {
            match self.direction {
                Direction::Capture => self.api.pa_stream_connect_record(
                    self.stream,
                    device_ptr,
                    &attr,
                    flags.to_native(),
                ),
                Direction::Render => self.api.pa_stream_connect_playback(
                    self.stream,
                    device_ptr,
                    &attr,
                    flags.to_native(),
                    ptr::null(),
                    ptr::null_mut(),
                ),
            }
        };
        if status < 0 {
            return Err(context_error(&self.api, self.context, "pa_stream_connect"));
        }
        Ok(())
    }

    fn state(&self) -> NativeState {
        NativeState::from_native(unsafe { self.api.pa_stream_get_state(self.stream) })
    }

    fn set_state_callback(&mut self, callback: Option<StateCallback>) {
        self.clear_state_callback();
        if let Some(callback) = callback {
            self.state_slot = Box::into_raw(Box::new(StateSlot {
                api: self.api.clone(),
                callback,
            }));
            unsafe {
                self.api.pa_stream_set_state_callback(
                    self.stream,
                    Some(stream_state_trampoline),
                    self.state_slot.cast(),
                )
            };
        }
    }

    fn set_request_callback(&mut self, callback: Option<RequestCallback>) {
        self.install_request_trampoline(None, ptr::null_mut());
        if !self.request_slot.is_null() {
            drop(unsafe { Box::from_raw(self.request_slot) });
            self.request_slot = ptr::null_mut();
        }
        if let Some(callback) = callback {
            self.request_slot = Box::into_raw(Box::new(callback));
            self.install_request_trampoline(
                Some(stream_request_trampoline),
                self.request_slot.cast(),
            );
        }
    }

    fn peek(&mut self) -> Result<Fragment<'_>> {
        let mut data: *const c_void = ptr::null();
        let mut length: usize = 0;
        Error::from_status("pa_stream_peek", unsafe {
            self.api.pa_stream_peek(self.stream, &mut data, &mut length)
        })?;
        Ok(if length == 0 {
            Fragment::Empty
        } else if data.is_null() {
            Fragment::Hole(length)
        } else {
            // Safety: libpulse keeps the fragment alive until pa_stream_drop,
            // which needs `&mut self` and therefore ends this borrow first.
            Fragment::Data(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), length) })
        })
    }

    fn discard(&mut self) -> Result<()> {
        Error::from_status("pa_stream_drop", unsafe {
            self.api.pa_stream_drop(self.stream)
        })
    }

    fn writable_size(&self) -> usize {
        match unsafe { self.api.pa_stream_writable_size(self.stream) } {
            usize::MAX => 0,
            size => size,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        // Without a free callback libpulse copies the data before returning.
        let status = unsafe {
            self.api.pa_stream_write(
                self.stream,
                data.as_ptr().cast(),
                data.len(),
                None,
                0,
                pulse_sys::PA_SEEK_RELATIVE,
            )
        };
        if status < 0 {
            return Err(context_error(&self.api, self.context, "pa_stream_write"));
        }
        Ok(data.len())
    }

    fn cork(&mut self, cork: bool) -> Result<()> {
        let operation = unsafe {
            self.api
                .pa_stream_cork(self.stream, c_int::from(cork), None, ptr::null_mut())
        };
        if operation.is_null() {
            return Err(context_error(&self.api, self.context, "pa_stream_cork"));
        }
        unsafe { self.api.pa_operation_unref(operation) };
        Ok(())
    }

    fn set_volume(&mut self, linear: f64) -> Result<()> {
        let mut volume = pulse_sys::pa_cvolume::default();
        let operation = unsafe {
            let value = self.api.pa_sw_volume_from_linear(linear);
            self.api
                .pa_cvolume_set(&mut volume, c_uint::from(self.channels), value);
            let index = self.api.pa_stream_get_index(self.stream);
            if index == u32::MAX {
                return Err(context_error(&self.api, self.context, "pa_stream_get_index"));
            }
            match self.direction {
                Direction::Capture => self.api.pa_context_set_source_output_volume(
                    self.context,
                    index,
                    &volume,
                    None,
                    ptr::null_mut(),
                ),
                Direction::Render => self.api.pa_context_set_sink_input_volume(
                    self.context,
                    index,
                    &volume,
                    None,
                    ptr::null_mut(),
                ),
            }
        };
        if operation.is_null() {
            return Err(context_error(&self.api, self.context, "pa_context_set_volume"));
        }
        unsafe { self.api.pa_operation_unref(operation) };
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.set_request_callback(None);
        self.clear_state_callback();
        if self.disconnected || !self.is_good() {
            return Ok(());
        }
        self.disconnected = true;
        Error::from_status("pa_stream_disconnect", unsafe {
            self.api.pa_stream_disconnect(self.stream)
        })
    }
}

impl Drop for PulseStream {
    fn drop(&mut self) {
        if let Err(error) = self.disconnect() {
            tracing::error!("Failed to disconnect stream: {:?}", error);
        }
        unsafe { self.api.pa_stream_unref(self.stream) };
    }
}
