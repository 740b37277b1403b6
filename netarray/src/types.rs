//! Core identifier and counter types.

use crate::counter::next_skipping_sentinel;

/// A stable item identity, unique within one array.
///
/// Identities are assigned lazily by the owning array and never reused.
/// [`ItemId::NONE`] marks an item that has not been assigned one yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemId(u32);

impl ItemId {
    /// The "unassigned" identity.
    pub const NONE: Self = Self(u32::MAX);

    /// Creates an item identity from its wire value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw identity value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the unassigned identity.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    /// Returns the next identity, never yielding [`ItemId::NONE`].
    #[must_use]
    pub fn next(self) -> Self {
        Self(next_skipping_sentinel(self.0))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u32> for ItemId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<ItemId> for u32 {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Per-item mutation counter.
///
/// Compared for equality only: a differing version means "changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemVersion(u32);

impl ItemVersion {
    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the following version, wrapping on overflow.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Per-array delta sequence counter.
///
/// Bumped whenever array content changes. Stamped on the wire as the
/// version of "current state" and stored on received items as the last
/// sequence that confirmed them. [`DeltaSeq::NONE`] (`-1`) stands for
/// "no prior snapshot" and is never produced by [`DeltaSeq::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaSeq(i32);

impl DeltaSeq {
    /// The "no snapshot" sequence.
    pub const NONE: Self = Self(-1);

    /// Creates a sequence value from its wire value.
    #[must_use]
    pub const fn new(seq: i32) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns `true` if this is the "no snapshot" sequence.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == -1
    }

    /// Returns the next sequence, never yielding [`DeltaSeq::NONE`].
    #[must_use]
    pub fn next(self) -> Self {
        Self(next_skipping_sentinel(self.0))
    }
}

impl Default for DeltaSeq {
    fn default() -> Self {
        Self(0)
    }
}

/// An opaque reference to an object that may not be resolvable locally yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefHandle(u64);

impl RefHandle {
    /// Creates a handle from its raw value.
    #[must_use]
    pub const fn new(handle: u64) -> Self {
        Self(handle)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Caller-assigned identifier of one transmitted delta record.
///
/// Used to match transport acknowledgments with the snapshot the record
/// was diffed into. Must be strictly increasing per observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SendId(u32);

impl SendId {
    /// Creates a send identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_default_is_none() {
        assert!(ItemId::default().is_none());
        assert!(!ItemId::new(0).is_none());
    }

    #[test]
    fn item_id_next_skips_none() {
        assert_eq!(ItemId::new(1).next(), ItemId::new(2));
        assert_eq!(ItemId::new(u32::MAX - 1).next(), ItemId::new(0));
    }

    #[test]
    fn item_id_conversions() {
        let id: ItemId = 42u32.into();
        assert_eq!(id.raw(), 42);
        let raw: u32 = id.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn item_version_wraps() {
        assert_eq!(ItemVersion::new(u32::MAX).next(), ItemVersion::new(0));
        assert_eq!(ItemVersion::default().next().raw(), 1);
    }

    #[test]
    fn delta_seq_default_and_none() {
        assert_eq!(DeltaSeq::default().raw(), 0);
        assert!(DeltaSeq::NONE.is_none());
        assert!(DeltaSeq::NONE < DeltaSeq::default());
    }

    #[test]
    fn delta_seq_next_skips_none() {
        assert_eq!(DeltaSeq::new(-2).next(), DeltaSeq::new(0));
        assert_eq!(DeltaSeq::new(i32::MAX).next(), DeltaSeq::new(i32::MIN));
    }

    #[test]
    fn delta_seq_ordering_is_numeric() {
        assert!(DeltaSeq::new(3) < DeltaSeq::new(5));
        assert!(DeltaSeq::new(-1) < DeltaSeq::new(0));
    }

    #[test]
    fn ref_handle_and_send_id() {
        assert_eq!(RefHandle::new(7).raw(), 7);
        assert!(SendId::new(1) < SendId::new(2));
        assert_eq!(SendId::default().raw(), 0);
    }

    #[test]
    fn item_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ItemId::new(1));
        set.insert(ItemId::new(2));
        set.insert(ItemId::new(1));
        assert_eq!(set.len(), 2);
    }
}
