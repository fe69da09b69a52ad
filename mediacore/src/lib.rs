// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # mediacore - real-time audio streaming and SDP id negotiation
//!
//! Safe building blocks for the media layer of a VoIP client: PulseAudio capture
//! and render streams, software and hardware gain, and the registries that map
//! media formats and RTP header extensions to dynamic SDP ids.
//!
//! ## Overview
//!
//! Audio goes through an [`AudioSystem`], which owns one native backend and its
//! mainloop lock. The PulseAudio backend wraps the raw FFI of [`pulse_sys`],
//! loaded at runtime with [`load_api`]. A [`SimulatedBackend`] stands in for the
//! sound server in tests and demos.
//!
//! ### Key Concepts
//!
//! - **Mainloop lock**: every stream state change and every backend callback
//!   happens under it; blocking calls wait on it monitor-style
//! - **Capture**: a [`CaptureStream`] buffers up to 100 ms delivered by the
//!   backend and hands out at most 20 ms per [`CaptureStream::read`]
//! - **Render**: a [`RenderStream`] writes only what the sink can take and reports
//!   the rest as [`RenderStatus::NotConsumed`]
//! - **Gain**: a shared [`GainControl`], applied per sample or as native volume
//!   depending on the backend's [`GainMode`]
//! - **Registries**: [`PayloadTypeRegistry`] and [`ExtensionRegistry`], owned by
//!   one negotiating session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ AudioSystem │  (backend + mainloop lock)
//! └──────┬──────┘
//!        │
//!        ├─► CaptureStream ◄── read callback ── native record stream
//!        │
//!        └─► RenderStream  ──► write ─────────► native playback stream
//!
//! PayloadTypeRegistry / ExtensionRegistry   (per SDP session)
//! ```
//!
//! ## Examples
//!
//! ### Capturing from a simulated source
//!
//! ```
//! use mediacore::{AudioSystem, SimulatedBackend, StreamConfig};
//!
//! # fn main() -> Result<(), mediacore::Error> {
//! let (backend, driver) = SimulatedBackend::new(None);
//! let system = AudioSystem::new(backend);
//!
//! let capture = system.create_capture_stream(&StreamConfig::default().with_sample_rate(8_000))?;
//! capture.start()?;
//!
//! let native = driver.last_stream().expect("stream was created");
//! native.deliver(&[0u8; 160]);
//!
//! let mut buffer = [0u8; 320];
//! let read = capture.read(&mut buffer)?;
//! assert_eq!(read.length, 160);
//! # Ok(())
//! # }
//! ```
//!
//! ### Negotiating payload types
//!
//! ```
//! use mediacore::{MediaFormat, PayloadTypeRegistry};
//!
//! # fn main() -> Result<(), mediacore::Error> {
//! let mut registry = PayloadTypeRegistry::new();
//! registry.add_mapping(MediaFormat::new("opus", 48_000).with_channels(2), 111)?;
//!
//! let speex = registry.obtain_payload_type(&MediaFormat::new("speex", 16_000))?;
//! assert_eq!(speex, 96);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`AudioSystem`], [`CaptureStream`] and [`RenderStream`] are `Send + Sync`;
//!   one thread may block in `read` while another calls `stop`
//! - Registries are plain values mutated through `&mut self`

mod api;
mod backend;
mod capture;
mod error;
mod format;
mod gain;
mod mainloop;
mod registry;
mod render;
mod ring;
mod stream;
mod system;

pub mod config;

pub use api::{PulseApi, PulseApiHandle, load_api};
pub use backend::{
    Backend, BufferAttr, Direction, Fragment, NativeState, NativeStream, RequestCallback,
    StateCallback, StreamFlags,
    pulse::PulseBackend,
    simulated::{ConnectBehavior, SimulatedBackend, SimulatedDriver, SimulatedStreamHandle},
};
pub use capture::{CaptureRead, CaptureStream};
pub use config::StreamConfig;
pub use error::{ConflictReason, Error, RegistryKind, Result};
pub use format::{SampleFormat, StreamSpec};
pub use gain::{GainControl, GainMode, MAX_GAIN_LEVEL, apply_gain};
pub use mainloop::{Mainloop, MainloopCell, MainloopGuard, SoftMainloop};
pub use registry::{
    extension::{
        EXTENSION_IDS, ExtensionDirection, ExtensionRegistry, HeaderForm, ONE_BYTE_IDS,
        RtpExtension,
    },
    payload::{DYNAMIC_PAYLOAD_TYPES, MediaFormat, PayloadTypeRegistry},
};
pub use render::{RenderOutcome, RenderStatus, RenderStream};
pub use ring::RingBuffer;
pub use stream::StreamState;
pub use system::AudioSystem;
