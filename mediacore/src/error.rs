// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for media core operations.
//!
//! This module defines the error type shared by the registries and the audio
//! streams, mapping native libpulse status codes to idiomatic Rust variants.

use std::fmt;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Which dynamic id space an allocation or conflict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// Dynamic RTP payload types (96..=127).
    PayloadType,
    /// RTP header extension ids (1..=255).
    Extension,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKind::PayloadType => f.write_str("payload type"),
            RegistryKind::Extension => f.write_str("extension id"),
        }
    }
}

/// Why an explicit id registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The id is already mapped to a different key.
    AlreadyBound,
    /// The id lies outside the range legal for the registry.
    OutOfRange,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::AlreadyBound => f.write_str("already bound to another entry"),
            ConflictReason::OutOfRange => f.write_str("outside the dynamic range"),
        }
    }
}

/// Errors that can occur in the media core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Every id in the dynamic range has been handed out.
    #[error("No free {kind} left")]
    AllocationExhausted { kind: RegistryKind },

    /// An explicit mapping collides with the registry contents or range.
    #[error("Conflict on id {id}: {reason}")]
    Conflict { id: u8, reason: ConflictReason },

    /// The backend could not create or connect a stream.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A data call was made on a stream with no native handle.
    #[error("Stream not connected")]
    NotConnected,

    /// The backend reported the stream as failed or terminated.
    #[error("Stream failed")]
    StreamFailed,

    /// A native libpulse call returned an error code.
    #[error("Native call {operation} failed with code {code}")]
    Native { operation: &'static str, code: i32 },

    /// An argument was invalid (e.g. an unsupported bit depth).
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or interact with the libpulse dynamic library.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts a libpulse return code to a Rust [`Result`].
    ///
    /// libpulse reports success as zero and failure as a negative error code.
    ///
    /// ```ignore
    /// let status = unsafe { api.pa_stream_drop(stream) };
    /// Error::from_status("pa_stream_drop", status)?;
    /// ```
    pub fn from_status(operation: &'static str, status: i32) -> Result<()> {
        if status >= 0 {
            Ok(())
        } else {
            Err(Error::Native {
                operation,
                code: status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_status_maps_to_native() {
        assert!(Error::from_status("pa_stream_drop", 0).is_ok());
        match Error::from_status("pa_stream_drop", -3) {
            Err(Error::Native { operation, code }) => {
                assert_eq!(operation, "pa_stream_drop");
                assert_eq!(code, -3);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn conflict_message_names_the_reason() {
        let error = Error::Conflict {
            id: 200,
            reason: ConflictReason::OutOfRange,
        };
        assert_eq!(
            error.to_string(),
            "Conflict on id 200: outside the dynamic range"
        );
    }
}
