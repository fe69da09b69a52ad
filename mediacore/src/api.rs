// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime loading of the libpulse function table.

use std::sync::Arc;

use tracing::debug;

use crate::Result;

/// The dynamically resolved libpulse function table.
pub type PulseApi = pulse_sys::LibPulse;

/// Shared handle to the loaded library, kept alive by every object using it.
pub type PulseApiHandle = Arc<PulseApi>;

/// Loads libpulse from `path` and resolves all symbols used by the crate.
///
/// ```no_run
/// use mediacore::{config::default_library_path, load_api};
///
/// # fn main() -> Result<(), mediacore::Error> {
/// let api = load_api(default_library_path())?;
/// # Ok(())
/// # }
/// ```
pub fn load_api(path: impl AsRef<std::ffi::OsStr>) -> Result<PulseApiHandle> {
    let path = path.as_ref();
    debug!(?path, "loading libpulse");
    // Safety: libpulse has no library constructors with preconditions.
    let api = unsafe { PulseApi::new(path)? };
    Ok(Arc::new(api))
}
