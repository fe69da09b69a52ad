// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RTP header extension ids negotiated through `a=extmap` (RFC 8285).

use std::{
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    ops::RangeInclusive,
};

use super::DynamicRegistry;
use crate::{RegistryKind, Result};

/// Extension ids available for negotiation.
pub const EXTENSION_IDS: RangeInclusive<u8> = 1..=255;

/// Ids that fit the one-byte header form.
pub const ONE_BYTE_IDS: RangeInclusive<u8> = 1..=14;

/// Header layout an extension id requires on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderForm {
    OneByte,
    TwoByte,
}

/// The `direction` of an `a=extmap` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExtensionDirection {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl fmt::Display for ExtensionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtensionDirection::SendRecv => "sendrecv",
            ExtensionDirection::SendOnly => "sendonly",
            ExtensionDirection::RecvOnly => "recvonly",
            ExtensionDirection::Inactive => "inactive",
        })
    }
}

/// An RTP header extension, identified by its URI.
///
/// Direction and attributes describe a particular offer and do not take part
/// in equality or hashing.
#[derive(Debug, Clone)]
pub struct RtpExtension {
    pub uri: String,
    pub direction: ExtensionDirection,
    pub attributes: Option<String>,
}

impl RtpExtension {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            direction: ExtensionDirection::default(),
            attributes: None,
        }
    }

    pub fn with_direction(mut self, direction: ExtensionDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_attributes(mut self, attributes: impl Into<String>) -> Self {
        self.attributes = Some(attributes.into());
        self
    }
}

impl PartialEq for RtpExtension {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for RtpExtension {}

impl Hash for RtpExtension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

/// Session-wide map between header extensions and their ids.
///
/// ```
/// use mediacore::{ExtensionRegistry, HeaderForm, RtpExtension};
///
/// # fn main() -> Result<(), mediacore::Error> {
/// let mut registry = ExtensionRegistry::new();
/// let level = RtpExtension::new("urn:ietf:params:rtp-hdrext:ssrc-audio-level");
///
/// let id = registry.obtain_extension_id(&level)?;
/// assert_eq!(id, 1);
/// assert_eq!(ExtensionRegistry::header_form(id), Some(HeaderForm::OneByte));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    inner: DynamicRegistry<RtpExtension>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DynamicRegistry::new(RegistryKind::Extension, EXTENSION_IDS),
        }
    }

    /// Returns the id of `extension`, allocating one if needed.
    ///
    /// Allocation does not try to stay within the one-byte range.
    pub fn obtain_extension_id(&mut self, extension: &RtpExtension) -> Result<u8> {
        self.inner.obtain(extension, None)
    }

    /// Registers an id chosen by the remote party.
    pub fn add_mapping(&mut self, extension: RtpExtension, id: u8) -> Result<()> {
        self.inner.add_mapping(extension, id)
    }

    pub fn find_extension(&self, id: u8) -> Option<&RtpExtension> {
        self.inner.find(id)
    }

    pub fn extension_id_for(&self, extension: &RtpExtension) -> Option<u8> {
        self.inner.id_for(extension)
    }

    /// An owned copy of every mapping.
    pub fn mappings(&self) -> HashMap<RtpExtension, u8> {
        self.inner.mappings()
    }

    /// The header form an id needs; `None` for the reserved id 0.
    pub fn header_form(id: u8) -> Option<HeaderForm> {
        if ONE_BYTE_IDS.contains(&id) {
            Some(HeaderForm::OneByte)
        } else if EXTENSION_IDS.contains(&id) {
            Some(HeaderForm::TwoByte)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }
}
