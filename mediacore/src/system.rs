// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The audio system: one backend, one mainloop lock, many streams.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::{
    CaptureStream, GainControl, GainMode, RenderStream, Result, StreamConfig, StreamSpec,
    api::PulseApiHandle,
    backend::{Backend, Direction, pulse::PulseBackend},
    stream::StreamShared,
};

/// Shared state of an [`AudioSystem`].
///
/// Streams hold a reference so the backend outlives every native stream it
/// created.
pub(crate) struct SystemContext {
    pub(crate) backend: Box<dyn Backend>,
    gain_mode: OnceLock<GainMode>,
}

impl SystemContext {
    /// Queries the backend once and caches the answer.
    pub(crate) fn gain_mode(&self) -> GainMode {
        *self.gain_mode.get_or_init(|| {
            let version = self.backend.library_version();
            let mode = GainMode::from_library_version(version.as_deref());
            debug!(?version, ?mode, "selected gain mode");
            mode
        })
    }
}

/// Entry point for creating capture and render streams.
///
/// The system is cheaply cloneable and `Send + Sync`; the streams it creates
/// are `Send + Sync` as well and may be driven from different threads.
///
/// ```no_run
/// use mediacore::{AudioSystem, StreamConfig, config::default_library_path, load_api};
///
/// # fn main() -> Result<(), mediacore::Error> {
/// let api = load_api(default_library_path())?;
/// let system = AudioSystem::pulse(api, "softphone")?;
///
/// let capture = system.create_capture_stream(&StreamConfig::default().with_sample_rate(16_000))?;
/// capture.start()?;
///
/// let mut buffer = vec![0u8; capture.fragment_size()];
/// let read = capture.read(&mut buffer)?;
/// println!("{} bytes captured at {} ns", read.length, read.timestamp_ns);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AudioSystem {
    context: Arc<SystemContext>,
}

impl AudioSystem {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            context: Arc::new(SystemContext {
                backend: Box::new(backend),
                gain_mode: OnceLock::new(),
            }),
        }
    }

    /// Connects to the PulseAudio server through a loaded libpulse.
    pub fn pulse(api: PulseApiHandle, app_name: &str) -> Result<Self> {
        Ok(Self::new(PulseBackend::new(api, app_name)?))
    }

    /// Gain mode chosen for this system's backend.
    pub fn gain_mode(&self) -> GainMode {
        self.context.gain_mode()
    }

    pub fn library_version(&self) -> Option<String> {
        self.context.backend.library_version()
    }

    /// Creates an unconnected capture stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArg`] for unsupported formats.
    pub fn create_capture_stream(&self, config: &StreamConfig) -> Result<CaptureStream> {
        let shared = self.create_shared(config, Direction::Capture)?;
        Ok(CaptureStream::new(shared))
    }

    /// Creates an unconnected render stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArg`] for unsupported formats.
    pub fn create_render_stream(&self, config: &StreamConfig) -> Result<RenderStream> {
        let shared = self.create_shared(config, Direction::Render)?;
        Ok(RenderStream::new(shared))
    }

    fn create_shared(
        &self,
        config: &StreamConfig,
        direction: Direction,
    ) -> Result<Arc<StreamShared>> {
        let spec = StreamSpec::resolve(config)?;
        let gain = config.gain.map(GainControl::new).unwrap_or_default();
        Ok(StreamShared::new(
            self.context.clone(),
            direction,
            spec,
            gain,
        ))
    }
}
