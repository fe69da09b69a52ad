// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Stream configuration and library path resolution.
//!
//! [`StreamConfig`] is what callers hand to
//! [`AudioSystem::create_capture_stream`](crate::AudioSystem::create_capture_stream)
//! and [`AudioSystem::create_render_stream`](crate::AudioSystem::create_render_stream).
//! Every field is optional; [`crate::StreamSpec::resolve`] fills in the defaults.

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`default_library_path`].
pub const LIBRARY_PATH_ENV: &str = "MEDIACORE_PULSE_LIBRARY";

/// Sample rate used when none is configured.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Channel count used when none is configured.
pub const DEFAULT_CHANNELS: u8 = 1;

/// Bit depth used when none is configured.
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// Media role announced to the sound server when none is configured.
pub const DEFAULT_MEDIA_ROLE: &str = "phone";

/// Requested format and routing of a capture or render stream.
///
/// ```
/// let config: mediacore::StreamConfig =
///     serde_json::from_str(r#"{"sample_rate": 8000, "device": "alsa_input.usb"}"#).unwrap();
/// assert_eq!(config.sample_rate, Some(8000));
/// assert_eq!(config.channels, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u16>,
    /// Device locator; `None` picks the server default.
    pub device: Option<String>,
    pub media_role: Option<String>,
    /// Initial gain level in percent.
    pub gain: Option<f32>,
}

impl StreamConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = Some(bits);
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_gain(mut self, level: f32) -> Self {
        self.gain = Some(level);
        self
    }
}

/// Returns the path of the libpulse shared object.
///
/// This is `libpulse.so.0`, resolved through the dynamic linker search path,
/// unless [`LIBRARY_PATH_ENV`] is set.
pub fn default_library_path() -> std::path::PathBuf {
    std::env::var_os(LIBRARY_PATH_ENV)
        .filter(|path| !path.is_empty())
        .map(Into::into)
        .unwrap_or_else(|| "libpulse.so.0".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = StreamConfig::default()
            .with_sample_rate(16_000)
            .with_channels(2)
            .with_bits_per_sample(32)
            .with_device("sink0")
            .with_gain(80.0);

        assert_eq!(config.sample_rate, Some(16_000));
        assert_eq!(config.channels, Some(2));
        assert_eq!(config.bits_per_sample, Some(32));
        assert_eq!(config.device.as_deref(), Some("sink0"));
        assert_eq!(config.gain, Some(80.0));
        assert_eq!(config.media_role, None);
    }
}
