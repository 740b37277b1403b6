//! Replicated items and the payload codec seam.

use bitstream::{BitReader, BitVecWriter};

use crate::error::CodecResult;
use crate::refs::{RefContext, ReferenceResolver};
use crate::types::{DeltaSeq, ItemId, ItemVersion};

/// Replication bookkeeping carried by every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMeta {
    pub(crate) id: ItemId,
    pub(crate) version: ItemVersion,
    pub(crate) last_seen: DeltaSeq,
}

impl ItemMeta {
    pub(crate) fn unassigned() -> Self {
        Self {
            id: ItemId::NONE,
            version: ItemVersion::default(),
            last_seen: DeltaSeq::NONE,
        }
    }

    /// The item's identity, or [`ItemId::NONE`] before first transmission.
    #[must_use]
    pub const fn id(&self) -> ItemId {
        self.id
    }

    /// The item's local mutation counter.
    #[must_use]
    pub const fn version(&self) -> ItemVersion {
        self.version
    }

    /// The sender sequence that last wrote this item on the receiving side.
    ///
    /// [`DeltaSeq::NONE`] for items never received.
    #[must_use]
    pub const fn last_seen(&self) -> DeltaSeq {
        self.last_seen
    }
}

/// One element of a replicated array: bookkeeping plus the user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NetItem<P> {
    pub(crate) meta: ItemMeta,
    pub(crate) value: P,
}

impl<P> NetItem<P> {
    pub(crate) fn new(value: P) -> Self {
        Self {
            meta: ItemMeta::unassigned(),
            value,
        }
    }

    /// Replication bookkeeping for this item.
    #[must_use]
    pub const fn meta(&self) -> &ItemMeta {
        &self.meta
    }

    /// Shorthand for `meta().id()`.
    #[must_use]
    pub const fn id(&self) -> ItemId {
        self.meta.id
    }

    /// The item payload.
    #[must_use]
    pub const fn value(&self) -> &P {
        &self.value
    }
}

/// Writes one item's payload.
pub trait ItemEncode {
    /// Appends this item's payload bits; the matching decode must consume exactly these.
    fn encode(&self, writer: &mut BitVecWriter) -> CodecResult<()>;
}

/// Reads one item's payload in place.
///
/// References must be resolved through `refs` so the decoder can track the
/// handles that are not resolvable yet and replay the payload later.
pub trait ItemDecode<R: ReferenceResolver + ?Sized> {
    /// Overwrites this item's fields from a payload written by [`ItemEncode::encode`].
    fn decode(&mut self, reader: &mut BitReader<'_>, refs: &mut RefContext<'_, R>)
        -> CodecResult<()>;
}
