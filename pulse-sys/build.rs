// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Build script for the `pulse-sys` FFI crate.
//!
//! Generates Rust bindings for the used subset of the PulseAudio client API
//! with `bindgen`. Symbols are resolved at runtime through `libloading`, so
//! only the headers are needed at build time, not the library.
//!
//! Extra include directories can be given in `PULSE_INCLUDE_DIRS`, separated
//! like `PATH`.

use std::env;
use std::path::PathBuf;

/// Functions resolved from `libpulse` when the library is loaded.
///
/// Every entry must be exported by the library or loading fails.
const FUNCTIONS: &[&str] = &[
    "pa_get_library_version",
    "pa_strerror",
    "pa_threaded_mainloop_new",
    "pa_threaded_mainloop_free",
    "pa_threaded_mainloop_start",
    "pa_threaded_mainloop_stop",
    "pa_threaded_mainloop_lock",
    "pa_threaded_mainloop_unlock",
    "pa_threaded_mainloop_wait",
    "pa_threaded_mainloop_signal",
    "pa_threaded_mainloop_get_api",
    "pa_proplist_new",
    "pa_proplist_free",
    "pa_proplist_sets",
    "pa_context_new_with_proplist",
    "pa_context_connect",
    "pa_context_disconnect",
    "pa_context_unref",
    "pa_context_errno",
    "pa_context_get_state",
    "pa_context_set_state_callback",
    "pa_context_set_sink_input_volume",
    "pa_context_set_source_output_volume",
    "pa_operation_unref",
    "pa_stream_new_with_proplist",
    "pa_stream_unref",
    "pa_stream_connect_record",
    "pa_stream_connect_playback",
    "pa_stream_disconnect",
    "pa_stream_get_state",
    "pa_stream_get_index",
    "pa_stream_set_state_callback",
    "pa_stream_set_read_callback",
    "pa_stream_set_write_callback",
    "pa_stream_peek",
    "pa_stream_drop",
    "pa_stream_writable_size",
    "pa_stream_write",
    "pa_stream_cork",
    "pa_cvolume_set",
    "pa_sw_volume_from_linear",
];

/// Types whose constants are needed even when no allowlisted function names them.
const TYPES: &[&str] = &[
    "pa_sample_spec",
    "pa_buffer_attr",
    "pa_cvolume",
    "pa_sample_format(_t)?",
    "pa_context_state(_t)?",
    "pa_context_flags(_t)?",
    "pa_stream_state(_t)?",
    "pa_stream_flags(_t)?",
    "pa_seek_mode(_t)?",
];

const VARS: &[&str] = &[
    "PA_CHANNELS_MAX",
    "PA_PROP_APPLICATION_NAME",
    "PA_PROP_MEDIA_ROLE",
];

fn include_dirs() -> Vec<String> {
    println!("cargo:rerun-if-env-changed=PULSE_INCLUDE_DIRS");
    env::var_os("PULSE_INCLUDE_DIRS")
        .map(|dirs| {
            env::split_paths(&dirs)
                .map(|dir| dir.to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Main build entry point.
fn main() {
    let includes_dirs = include_dirs();
    for include_dir in &includes_dirs {
        println!("cargo:include={include_dir}");
    }
    println!("cargo:rerun-if-changed=wrapper.h");

    let mut builder = bindgen::builder()
        .clang_args(includes_dirs.iter().map(|dir| format!("-I{dir}")))
        .header("wrapper.h")
        .derive_default(true)
        .derive_debug(true)
        .prepend_enum_name(false)
        .dynamic_library_name("LibPulse")
        .dynamic_link_require_all(true);
    for function in FUNCTIONS {
        builder = builder.allowlist_function(function);
    }
    for ty in TYPES {
        builder = builder.allowlist_type(ty);
    }
    for var in VARS {
        builder = builder.allowlist_var(var);
    }

    let bindings = builder.generate().unwrap();

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Could not write bindings");
}
