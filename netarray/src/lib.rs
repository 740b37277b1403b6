//! Delta replication for ordered, keyed arrays.
//!
//! A host owns a [`NetArray`] and sends each observer only what changed
//! since the last state that observer acknowledged. Observers apply the
//! records to their own copy, inferring deletions the host could not
//! confirm, and retry items whose references were not yet resolvable.
//!
//! # Features
//!
//! - Stable item identities and per-item versions
//! - Write-side diffing against an [`AckSnapshot`]
//! - Read-side application with removal, addition and change notifications
//! - Deferred re-decoding of items with unresolved references
//! - Per-observer acknowledgement tracking via [`ObserverChannel`]
//!
//! # Design Principles
//!
//! - **Bounded input** - Record counts are checked against [`DeltaLimits`]
//!   before any item is touched.
//! - **Fail closed** - A failed decode desynchronizes the array until it is
//!   reset.
//! - **Deterministic** - Same inputs produce the same bits.

mod array;
mod channel;
mod counter;
mod error;
mod history;
mod item;
mod limits;
mod observer;
mod read;
mod refs;
mod snapshot;
mod sweep;
mod types;
mod write;

pub use array::NetArray;
pub use channel::ObserverChannel;
pub use counter::{next_skipping_sentinel, SentinelCounter};
pub use error::{CodecError, CodecResult, LimitKind};
pub use history::SnapshotHistory;
pub use item::{ItemDecode, ItemEncode, ItemMeta, NetItem};
pub use limits::DeltaLimits;
pub use observer::{ArrayEvent, ArrayObserver};
pub use read::{decode_delta, DecodeOutcome};
pub use refs::{
    NoReferences, RefContext, RefRecord, RefTable, ReferenceResolver, SavedPayload, TrackedRefs,
};
pub use snapshot::AckSnapshot;
pub use sweep::{update_unresolved, SweepOutcome};
pub use types::{DeltaSeq, ItemId, ItemVersion, RefHandle, SendId};
pub use write::{encode_delta, encode_delta_with_resend, PeerRole, WriteOutcome, WrittenDelta};
