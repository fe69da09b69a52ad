// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # pulse-sys: Raw FFI bindings to the PulseAudio client library
//!
//! This crate provides low-level, unsafe Rust bindings for the subset of
//! `libpulse` used by the media core: the threaded mainloop, the context, record
//! and playback streams, and channel volumes. The bindings are generated with
//! `bindgen`; the library is not linked at build time. [`LibPulse`] resolves
//! every symbol at runtime through `libloading`, so a host without PulseAudio
//! can still build and run everything that does not talk to a sound server.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `mediacore`
//! crate instead, which provides:
//! - RAII ownership of mainloop, context and stream handles
//! - Rust-idiomatic error handling with `Result`
//! - Capture/render streams guarded by the mainloop lock
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold
//! PulseAudio's invariants:
//! - Every context and stream call must be made with the threaded mainloop lock
//!   held, except `pa_threaded_mainloop_*` lifecycle calls
//! - Callbacks run on the mainloop thread with the lock held
//! - Pointers must remain valid for the duration of operations
//! - Null checks are the caller's responsibility
//!
//! ## Build Process
//!
//! Only the PulseAudio development headers are needed. Extra include
//! directories can be passed in `PULSE_INCLUDE_DIRS`.

// Suppress expected warnings from bindgen-generated code.
// See https://github.com/rust-lang/rust-bindgen/issues/1651.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]
#![allow(rustdoc::broken_intra_doc_links)]
#![allow(rustdoc::invalid_html_tags)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(deref_nullptr)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]

extern crate libloading;

// Include bindgen-generated FFI bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

// The C predicates are static inline and never exported by the library.

/// Returns whether a context state is neither failed nor terminated.
pub fn pa_context_is_good(state: pa_context_state_t) -> bool {
    matches!(
        state,
        PA_CONTEXT_CONNECTING | PA_CONTEXT_AUTHORIZING | PA_CONTEXT_SETTING_NAME | PA_CONTEXT_READY
    )
}

/// Returns whether a stream state is neither failed nor terminated.
pub fn pa_stream_is_good(state: pa_stream_state_t) -> bool {
    matches!(state, PA_STREAM_CREATING | PA_STREAM_READY)
}
