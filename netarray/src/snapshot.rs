//! Acknowledged snapshots that deltas are diffed against.

use std::collections::BTreeMap;

use crate::types::{DeltaSeq, ItemId, ItemVersion};

/// Identity to version mapping of what one observer holds, plus the delta
/// sequence it was taken at.
///
/// A point-in-time copy: it never references live items.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AckSnapshot {
    seq: DeltaSeq,
    versions: BTreeMap<ItemId, ItemVersion>,
}

impl AckSnapshot {
    pub(crate) fn new(seq: DeltaSeq, versions: BTreeMap<ItemId, ItemVersion>) -> Self {
        Self { seq, versions }
    }

    /// The sender's delta sequence when this snapshot was taken.
    #[must_use]
    pub const fn seq(&self) -> DeltaSeq {
        self.seq
    }

    /// Number of items in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Version recorded for an item.
    #[must_use]
    pub fn version_of(&self, id: ItemId) -> Option<ItemVersion> {
        self.versions.get(&id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.versions.contains_key(&id)
    }

    /// Identities in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.versions.keys().copied()
    }
}
