//! Per-observer connection state on the sending side.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use bitstream::BitVecWriter;

use crate::array::NetArray;
use crate::error::{CodecError, CodecResult};
use crate::history::SnapshotHistory;
use crate::item::ItemEncode;
use crate::snapshot::AckSnapshot;
use crate::types::{DeltaSeq, ItemId, SendId};
use crate::write::{encode_delta_with_resend, PeerRole, WriteOutcome};

/// What the sender knows about one observer: the snapshot it has
/// acknowledged, and the snapshots sent to it since.
///
/// Records are always diffed against the acknowledged snapshot, so a lost
/// record is repaired by the next write without any explicit resend.
///
/// Records must be applied in send order. Acknowledgements may lag behind
/// any number of writes: items stamped by an unacknowledged send newer than
/// the acknowledged snapshot are sent again, so the observer never sweeps
/// them as stale.
#[derive(Debug, Clone)]
pub struct ObserverChannel {
    role: PeerRole,
    acked: Option<AckSnapshot>,
    pending: SnapshotHistory<PendingSend>,
    /// Items sent by records evicted from `pending` before being settled.
    orphaned: BTreeSet<ItemId>,
}

#[derive(Debug, Clone)]
struct PendingSend {
    snapshot: AckSnapshot,
    sent: Vec<ItemId>,
}

impl ObserverChannel {
    /// Creates a channel that remembers up to `capacity` unacknowledged
    /// sends.
    #[must_use]
    pub fn new(role: PeerRole, capacity: NonZeroUsize) -> Self {
        Self {
            role,
            acked: None,
            pending: SnapshotHistory::new(capacity),
            orphaned: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn role(&self) -> PeerRole {
        self.role
    }

    /// Encodes a record for this observer and remembers it under `send_id`.
    ///
    /// Nothing is remembered when the array is unchanged.
    pub fn write<P: ItemEncode>(
        &mut self,
        array: &mut NetArray<P>,
        send_id: SendId,
        writer: &mut BitVecWriter,
    ) -> CodecResult<WriteOutcome> {
        if let Some(last) = self.pending.last_send() {
            if send_id <= last {
                return Err(CodecError::SendOutOfOrder {
                    last: last.raw(),
                    new: send_id.raw(),
                });
            }
        }
        let resend = self.in_flight();
        let outcome =
            encode_delta_with_resend(array, self.acked.as_ref(), &resend, self.role, writer)?;
        if let WriteOutcome::Written(delta) = &outcome {
            let pending = PendingSend {
                snapshot: delta.snapshot.clone(),
                sent: delta.changed_ids.clone(),
            };
            let acked_seq = self.acked_seq();
            if let Some((_, evicted)) = self.pending.insert(send_id, pending)? {
                if evicted.snapshot.seq() > acked_seq {
                    self.orphaned.extend(evicted.sent);
                }
            }
        }
        Ok(outcome)
    }

    /// Items an applied but unacknowledged record may have stamped past the
    /// acknowledged sequence.
    fn in_flight(&self) -> BTreeSet<ItemId> {
        let acked_seq = self.acked_seq();
        let mut ids = self.orphaned.clone();
        for (_, pending) in self.pending.iter() {
            if pending.snapshot.seq() > acked_seq {
                ids.extend(pending.sent.iter().copied());
            }
        }
        ids
    }

    fn acked_seq(&self) -> DeltaSeq {
        self.acked.as_ref().map_or(DeltaSeq::NONE, AckSnapshot::seq)
    }

    /// Promotes the snapshot sent under `send_id` to acknowledged.
    ///
    /// Older pending snapshots are discarded: the observer has applied a
    /// newer state, so acknowledgements for them are stale. Newer pending
    /// sends are kept.
    pub fn acknowledge(&mut self, send_id: SendId) -> CodecResult<()> {
        let snapshot = self
            .pending
            .take(send_id)
            .map(|pending| pending.snapshot)
            .ok_or(CodecError::SnapshotNotFound {
                send_id: send_id.raw(),
            })?;
        log::trace!(
            "send {} acknowledged at delta {}",
            send_id.raw(),
            snapshot.seq().raw()
        );
        self.acked = Some(snapshot);
        self.orphaned.clear();
        Ok(())
    }

    /// The snapshot the next record is diffed against.
    #[must_use]
    pub fn acknowledged(&self) -> Option<&AckSnapshot> {
        self.acked.as_ref()
    }

    /// Number of sends still awaiting acknowledgement.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forgets everything the observer acknowledged, so the next write
    /// sends every eligible item.
    pub fn reset(&mut self) {
        self.acked = None;
        self.pending.clear();
        self.orphaned.clear();
    }
}
