// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic RTP payload types (RFC 3551, 96..=127).

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    hash::{Hash, Hasher},
    ops::RangeInclusive,
};

use super::DynamicRegistry;
use crate::{RegistryKind, Result};

/// Payload type numbers available for dynamic assignment.
pub const DYNAMIC_PAYLOAD_TYPES: RangeInclusive<u8> = 96..=127;

/// A media format as described by an SDP `rtpmap`/`fmtp` pair.
///
/// Encoding names compare case-insensitively; everything else must match
/// exactly, including format parameters.
#[derive(Debug, Clone)]
pub struct MediaFormat {
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub parameters: BTreeMap<String, String>,
}

impl MediaFormat {
    pub fn new(encoding: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            encoding: encoding.into(),
            clock_rate,
            channels: 1,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

impl PartialEq for MediaFormat {
    fn eq(&self, other: &Self) -> bool {
        self.encoding.eq_ignore_ascii_case(&other.encoding)
            && self.clock_rate == other.clock_rate
            && self.channels == other.channels
            && self.parameters == other.parameters
    }
}

impl Eq for MediaFormat {}

impl Hash for MediaFormat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.encoding.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        self.clock_rate.hash(state);
        self.channels.hash(state);
        self.parameters.hash(state);
    }
}

impl fmt::Display for MediaFormat {
    /// Formats as the `rtpmap` encoding part, e.g. `opus/48000/2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.encoding, self.clock_rate)?;
        if self.channels > 1 {
            write!(f, "/{}", self.channels)?;
        }
        Ok(())
    }
}

/// Session-wide map between media formats and dynamic payload types.
///
/// ```
/// use mediacore::{MediaFormat, PayloadTypeRegistry};
///
/// # fn main() -> Result<(), mediacore::Error> {
/// let mut registry = PayloadTypeRegistry::new();
/// let opus = MediaFormat::new("opus", 48_000).with_channels(2);
///
/// let pt = registry.obtain_payload_type(&opus)?;
/// assert_eq!(pt, 96);
/// assert_eq!(registry.find_format(96), Some(&opus));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PayloadTypeRegistry {
    inner: DynamicRegistry<MediaFormat>,
    preferences: HashMap<MediaFormat, u8>,
}

impl Default for PayloadTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadTypeRegistry {
    pub fn new() -> Self {
        Self {
            inner: DynamicRegistry::new(RegistryKind::PayloadType, DYNAMIC_PAYLOAD_TYPES),
            preferences: HashMap::new(),
        }
    }

    /// Numbers to try first when allocating for specific formats, such as a
    /// configured `telephone-event` payload type.
    pub fn set_local_preferences(&mut self, preferences: HashMap<MediaFormat, u8>) {
        self.preferences = preferences;
    }

    /// Returns the payload type of `format`, allocating one if needed.
    ///
    /// # Errors
    ///
    /// [`crate::Error::AllocationExhausted`] once all 32 dynamic numbers are used.
    pub fn obtain_payload_type(&mut self, format: &MediaFormat) -> Result<u8> {
        let preferred = self.preferences.get(format).copied();
        self.inner.obtain(format, preferred)
    }

    /// Registers a payload type chosen by the remote party.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Conflict`] if `payload_type` is not dynamic or is bound to
    /// another format. The registry is unchanged on error.
    pub fn add_mapping(&mut self, format: MediaFormat, payload_type: u8) -> Result<()> {
        self.inner.add_mapping(format, payload_type)
    }

    pub fn find_format(&self, payload_type: u8) -> Option<&MediaFormat> {
        self.inner.find(payload_type)
    }

    /// Looks up a format without allocating.
    pub fn payload_type_for(&self, format: &MediaFormat) -> Option<u8> {
        self.inner.id_for(format)
    }

    /// An owned copy of every mapping.
    pub fn mappings(&self) -> HashMap<MediaFormat, u8> {
        self.inner.mappings()
    }

    pub fn range(&self) -> &RangeInclusive<u8> {
        self.inner.range()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}
