// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Software and hardware gain.
//!
//! A [`GainControl`] holds a level in percent and a mute flag. Streams read it on
//! every transfer: in [`GainMode::Software`] the samples are scaled in place, in
//! [`GainMode::Hardware`] the native stream volume is updated whenever the
//! effective factor changes.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use crate::SampleFormat;

/// Highest gain level, meaning unity.
pub const MAX_GAIN_LEVEL: f32 = 100.0;

/// Where the gain of a stream is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Samples are scaled by the stream on every read or write.
    Software,
    /// The native mixer volume of the stream is set.
    Hardware,
}

impl GainMode {
    /// Picks the mode for a native library version string.
    ///
    /// Libraries with a major version of one or more support per-stream volume;
    /// anything older or unparsable falls back to software gain.
    pub fn from_library_version(version: Option<&str>) -> Self {
        let major = version
            .and_then(|version| version.split('.').next())
            .and_then(|major| major.trim().parse::<u32>().ok());
        match major {
            Some(major) if major >= 1 => GainMode::Hardware,
            _ => GainMode::Software,
        }
    }
}

#[derive(Debug)]
struct GainInner {
    level: AtomicU32,
    muted: AtomicBool,
}

/// Shared, lock-free gain level.
///
/// Clones refer to the same level, so one control can be handed to a UI thread
/// while the stream reads it.
#[derive(Debug, Clone)]
pub struct GainControl {
    inner: Arc<GainInner>,
}

impl Default for GainControl {
    fn default() -> Self {
        Self::new(MAX_GAIN_LEVEL)
    }
}

impl GainControl {
    pub fn new(level: f32) -> Self {
        let control = Self {
            inner: Arc::new(GainInner {
                level: AtomicU32::new(MAX_GAIN_LEVEL.to_bits()),
                muted: AtomicBool::new(false),
            }),
        };
        control.set_level(level);
        control
    }

    /// Sets the level, clamped to `0.0..=100.0`. NaN is ignored.
    pub fn set_level(&self, level: f32) {
        if level.is_nan() {
            return;
        }
        let level = level.clamp(0.0, MAX_GAIN_LEVEL);
        self.inner.level.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.inner.level.load(Ordering::Relaxed))
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::Relaxed)
    }

    /// Linear factor in `0.0..=1.0`; zero when muted.
    pub fn factor(&self) -> f64 {
        if self.is_muted() {
            0.0
        } else {
            f64::from(self.level()) / f64::from(MAX_GAIN_LEVEL)
        }
    }
}

/// Scales interleaved PCM in place by `factor`.
///
/// Each scaled sample is rounded half to even and saturated to the sample
/// range. A trailing partial sample is left untouched. Unity is a no-op.
pub fn apply_gain(data: &mut [u8], format: SampleFormat, factor: f64) {
    if factor == 1.0 {
        return;
    }
    match format {
        SampleFormat::U8 => {
            for sample in data.iter_mut() {
                let centered = f64::from(i16::from(*sample) - 128);
                let scaled = (centered * factor).round_ties_even() + 128.0;
                *sample = scaled.clamp(0.0, 255.0) as u8;
            }
        }
        SampleFormat::S16Le => {
            for chunk in data.chunks_exact_mut(2) {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                let scaled = (f64::from(sample) * factor).round_ties_even();
                let scaled = scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
                chunk.copy_from_slice(&scaled.to_le_bytes());
            }
        }
        SampleFormat::S32Le => {
            for chunk in data.chunks_exact_mut(4) {
                let sample = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let scaled = (f64::from(sample) * factor).round_ties_even();
                let scaled = scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
                chunk.copy_from_slice(&scaled.to_le_bytes());
            }
        }
    }
}
