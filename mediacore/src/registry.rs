// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Session-scoped registries of dynamic SDP identifiers.
//!
//! A registry is a bijection between keys (media formats or header extensions)
//! and small integer ids drawn from a fixed range. Ids are either allocated
//! locally or registered as chosen by the remote party, and a key keeps its id
//! for the lifetime of the session.
//!
//! Registries are owned by a single negotiating session and take `&mut self` for
//! every mutation; there is no internal locking.

pub mod extension;
pub mod payload;

use std::{
    collections::HashMap,
    hash::Hash,
    ops::RangeInclusive,
};

use tracing::debug;

use crate::{ConflictReason, Error, RegistryKind, Result};

/// Bidirectional key/id map with a monotonic allocation cursor.
#[derive(Debug, Clone)]
pub(crate) struct DynamicRegistry<K> {
    kind: RegistryKind,
    range: RangeInclusive<u8>,
    by_key: HashMap<K, u8>,
    by_id: HashMap<u8, K>,
    cursor: u16,
}

impl<K> DynamicRegistry<K>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
{
    pub(crate) fn new(kind: RegistryKind, range: RangeInclusive<u8>) -> Self {
        Self {
            kind,
            cursor: u16::from(*range.start()),
            range,
            by_key: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub(crate) fn range(&self) -> &RangeInclusive<u8> {
        &self.range
    }

    /// Returns the id of `key`, allocating one if needed.
    ///
    /// A `preferred` id is used when it is in range and free. Otherwise the
    /// first free id at or above the cursor is taken; the cursor never moves
    /// back, so ids released by re-registration are not reallocated.
    pub(crate) fn obtain(&mut self, key: &K, preferred: Option<u8>) -> Result<u8> {
        if let Some(&id) = self.by_key.get(key) {
            return Ok(id);
        }

        if let Some(id) = preferred {
            if self.range.contains(&id) && !self.by_id.contains_key(&id) {
                self.bind(key.clone(), id);
                debug!(kind = %self.kind, id, ?key, "bound preferred id");
                return Ok(id);
            }
        }

        let end = u16::from(*self.range.end());
        while self.cursor <= end {
            let Ok(id) = u8::try_from(self.cursor) else {
                break;
            };
            self.cursor += 1;
            if !self.by_id.contains_key(&id) {
                self.bind(key.clone(), id);
                debug!(kind = %self.kind, id, ?key, "allocated id");
                return Ok(id);
            }
        }

        Err(Error::AllocationExhausted { kind: self.kind })
    }

    /// Records an id chosen elsewhere.
    ///
    /// The key's previous id, if any, is released. On error nothing changes.
    pub(crate) fn add_mapping(&mut self, key: K, id: u8) -> Result<()> {
        if !self.range.contains(&id) {
            return Err(Error::Conflict {
                id,
                reason: ConflictReason::OutOfRange,
            });
        }
        match self.by_id.get(&id) {
            Some(bound) if *bound == key => return Ok(()),
            Some(_) => {
                return Err(Error::Conflict {
                    id,
                    reason: ConflictReason::AlreadyBound,
                });
            }
            None => {}
        }

        if let Some(stale) = self.by_key.get(&key).copied() {
            self.by_id.remove(&stale);
            debug!(kind = %self.kind, stale, id, ?key, "remapped");
        } else {
            debug!(kind = %self.kind, id, ?key, "registered");
        }
        self.bind(key, id);
        Ok(())
    }

    fn bind(&mut self, key: K, id: u8) {
        self.by_id.insert(id, key.clone());
        self.by_key.insert(key, id);
    }

    pub(crate) fn find(&self, id: u8) -> Option<&K> {
        self.by_id.get(&id)
    }

    pub(crate) fn id_for(&self, key: &K) -> Option<u8> {
        self.by_key.get(key).copied()
    }

    pub(crate) fn mappings(&self) -> HashMap<K, u8> {
        self.by_key.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}
