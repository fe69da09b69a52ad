// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! PCM sample formats and resolved stream parameters.

use crate::{
    Error, Result,
    config::{
        DEFAULT_BITS_PER_SAMPLE, DEFAULT_CHANNELS, DEFAULT_MEDIA_ROLE, DEFAULT_SAMPLE_RATE,
        StreamConfig,
    },
};

/// Length of one native fragment, in tens of milliseconds.
const FRAGMENT_TENS_OF_MILLIS: usize = 2;

/// Length of the capture ring buffer, in tens of milliseconds.
const RING_TENS_OF_MILLIS: usize = 10;

/// Interleaved little-endian PCM sample encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    S16Le,
    S32Le,
}

impl SampleFormat {
    /// Picks the format for a bit depth.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(SampleFormat::U8),
            16 => Ok(SampleFormat::S16Le),
            32 => Ok(SampleFormat::S32Le),
            other => Err(Error::InvalidArg(format!(
                "unsupported bits per sample: {other}"
            ))),
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16Le => 2,
            SampleFormat::S32Le => 4,
        }
    }

    pub(crate) fn to_native(self) -> pulse_sys::pa_sample_format_t {
        match self {
            SampleFormat::U8 => pulse_sys::PA_SAMPLE_U8,
            SampleFormat::S16Le => pulse_sys::PA_SAMPLE_S16LE,
            SampleFormat::S32Le => pulse_sys::PA_SAMPLE_S32LE,
        }
    }
}

/// Fully resolved stream parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u8,
    pub format: SampleFormat,
    pub device: Option<String>,
    pub media_role: String,
}

impl StreamSpec {
    /// Applies defaults to unset fields and validates the result.
    pub fn resolve(config: &StreamConfig) -> Result<Self> {
        let sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let channels = config.channels.unwrap_or(DEFAULT_CHANNELS);
        let bits = config.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE);

        if sample_rate < 100 {
            return Err(Error::InvalidArg(format!(
                "sample rate too low: {sample_rate}"
            )));
        }
        if channels == 0 || u32::from(channels) > pulse_sys::PA_CHANNELS_MAX {
            return Err(Error::InvalidArg(format!(
                "unsupported channel count: {channels}"
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            format: SampleFormat::from_bits(bits)?,
            device: config.device.clone(),
            media_role: config
                .media_role
                .clone()
                .unwrap_or_else(|| DEFAULT_MEDIA_ROLE.to_string()),
        })
    }

    /// Size of one interleaved frame in bytes.
    pub fn frame_size(&self) -> usize {
        usize::from(self.channels) * self.format.bytes_per_sample()
    }

    pub fn bytes_per_ten_millis(&self) -> usize {
        (self.sample_rate as usize / 100) * self.frame_size()
    }

    /// Bytes per 20 ms; the native fragment size and the largest single read.
    pub fn fragment_size(&self) -> usize {
        self.bytes_per_ten_millis() * FRAGMENT_TENS_OF_MILLIS
    }

    /// Bytes per 100 ms; the capture ring buffer capacity.
    pub fn ring_capacity(&self) -> usize {
        self.bytes_per_ten_millis() * RING_TENS_OF_MILLIS
    }

    pub(crate) fn to_native(&self) -> pulse_sys::pa_sample_spec {
        pulse_sys::pa_sample_spec {
            format: self.format.to_native(),
            rate: self.sample_rate,
            channels: self.channels,
        }
    }
}
