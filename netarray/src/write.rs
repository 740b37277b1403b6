//! Delta encoding against an acknowledged snapshot.

use std::collections::{BTreeMap, BTreeSet};

use bitstream::BitVecWriter;

use crate::array::NetArray;
use crate::error::CodecResult;
use crate::item::{ItemEncode, ItemMeta};
use crate::snapshot::AckSnapshot;
use crate::types::{DeltaSeq, ItemId};

/// Which side of the connection is writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeerRole {
    /// The privileged host: every item is eligible.
    Authority,
    /// A restricted peer: only items that already have an identity are
    /// eligible, so it can only echo items it learned from the host.
    Restricted,
}

impl PeerRole {
    /// Returns `true` if an item with this bookkeeping may be written.
    #[must_use]
    pub const fn may_write(self, meta: &ItemMeta) -> bool {
        match self {
            Self::Authority => true,
            Self::Restricted => !meta.id.is_none(),
        }
    }
}

/// A delta record that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDelta {
    /// Snapshot of what the observer holds once it applies this record.
    pub snapshot: AckSnapshot,
    /// Number of explicit deletion entries.
    pub deleted: usize,
    /// Number of added or changed items.
    pub changed: usize,
    /// Identities of the added or changed items, in array order.
    pub changed_ids: Vec<ItemId>,
}

/// Result of [`encode_delta`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing changed since the acknowledged snapshot; no bits written.
    Unchanged,
    /// A record was written.
    Written(WrittenDelta),
}

/// Encodes the delta between `array` and the observer's acknowledged
/// snapshot.
///
/// Items without an identity are assigned one first if `role` may write
/// them. With no `acked` snapshot, every eligible item is sent.
///
/// Record layout:
///
/// ```text
/// i32  current delta sequence
/// i32  acked snapshot sequence (-1 if none)
/// u32  deleted count
/// u32  changed count
/// u32  deleted identity, repeated
/// u32  changed identity followed by the item payload, repeated
/// ```
pub fn encode_delta<P: ItemEncode>(
    array: &mut NetArray<P>,
    acked: Option<&AckSnapshot>,
    role: PeerRole,
    writer: &mut BitVecWriter,
) -> CodecResult<WriteOutcome> {
    encode_delta_with_resend(array, acked, &BTreeSet::new(), role, writer)
}

/// Like [`encode_delta`], but also sends every eligible item in `resend`
/// even when its version matches the acknowledged snapshot.
///
/// A sender with records in flight uses this for items that a newer,
/// possibly applied record stamped: the observer would otherwise treat
/// them as stale once this record's window covers that stamp.
pub fn encode_delta_with_resend<P: ItemEncode>(
    array: &mut NetArray<P>,
    acked: Option<&AckSnapshot>,
    resend: &BTreeSet<ItemId>,
    role: PeerRole,
    writer: &mut BitVecWriter,
) -> CodecResult<WriteOutcome> {
    if let Some(acked) = acked {
        if resend.is_empty() && acked.seq() == array.delta_seq() {
            let eligible = array.eligible_count(role);
            if acked.len() != eligible {
                log::warn!(
                    "acked snapshot holds {} items but {eligible} items are eligible to write",
                    acked.len()
                );
            }
            return Ok(WriteOutcome::Unchanged);
        }
    }

    let considered = array.count_eligible(role);
    let acked_len = acked.map_or(0, AckSnapshot::len);
    let mut deleted_budget = acked_len as i64 - considered as i64;

    let mut versions = BTreeMap::new();
    let mut changed = Vec::new();
    for index in 0..array.items.len() {
        if !role.may_write(&array.items[index].meta) {
            continue;
        }
        array.assign_identity_if_needed(index);
        let meta = array.items[index].meta;
        versions.insert(meta.id, meta.version);

        match acked.and_then(|acked| acked.version_of(meta.id)) {
            Some(version) if version == meta.version && !resend.contains(&meta.id) => {}
            Some(_) => changed.push(index),
            None => {
                changed.push(index);
                deleted_budget += 1;
            }
        }
    }

    let mut deleted: Vec<ItemId> = Vec::new();
    if let Some(acked) = acked {
        for id in acked.ids() {
            if deleted_budget <= 0 {
                break;
            }
            if !versions.contains_key(&id) {
                deleted.push(id);
                deleted_budget -= 1;
            }
        }
    }

    let current = array.delta_seq();
    let previous = acked.map_or(DeltaSeq::NONE, AckSnapshot::seq);
    writer.write_i32(current.raw());
    writer.write_i32(previous.raw());
    writer.write_u32(count_u32(deleted.len()));
    writer.write_u32(count_u32(changed.len()));
    for id in &deleted {
        writer.write_u32(id.raw());
    }
    for &index in &changed {
        let item = &array.items[index];
        writer.write_u32(item.meta.id.raw());
        item.value.encode(writer)?;
    }

    log::debug!(
        "wrote delta {} -> {}: {} deleted, {} changed",
        previous.raw(),
        current.raw(),
        deleted.len(),
        changed.len()
    );

    Ok(WriteOutcome::Written(WrittenDelta {
        snapshot: AckSnapshot::new(current, versions),
        deleted: deleted.len(),
        changed: changed.len(),
        changed_ids: changed
            .iter()
            .map(|&index| array.items[index].meta.id)
            .collect(),
    }))
}

fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use bitstream::BitReader;

    use super::*;
    use crate::error::CodecError;

    #[derive(Debug, Clone, PartialEq)]
    struct Value(u32);

    impl ItemEncode for Value {
        fn encode(&self, writer: &mut BitVecWriter) -> CodecResult<()> {
            writer.write_u32(self.0);
            Ok(())
        }
    }

    struct Header {
        current: i32,
        previous: i32,
        deleted: Vec<u32>,
        changed_count: u32,
    }

    fn read_header(bytes: &[u8]) -> Header {
        let mut reader = BitReader::new(bytes);
        let current = reader.read_i32().unwrap();
        let previous = reader.read_i32().unwrap();
        let deleted_count = reader.read_u32().unwrap();
        let changed_count = reader.read_u32().unwrap();
        let deleted = (0..deleted_count)
            .map(|_| reader.read_u32().unwrap())
            .collect();
        Header {
            current,
            previous,
            deleted,
            changed_count,
        }
    }

    fn written(outcome: WriteOutcome) -> WrittenDelta {
        match outcome {
            WriteOutcome::Written(delta) => delta,
            WriteOutcome::Unchanged => panic!("expected a written delta"),
        }
    }

    fn array_of(values: &[u32]) -> NetArray<Value> {
        let mut array = NetArray::new();
        for v in values {
            array.push(Value(*v));
        }
        array
    }

    #[test]
    fn first_write_sends_everything() {
        let mut array = array_of(&[10, 20, 30]);
        let mut writer = BitVecWriter::new();
        let delta = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());
        assert_eq!(delta.changed, 3);
        assert_eq!(delta.deleted, 0);
        assert_eq!(delta.snapshot.len(), 3);
        assert_eq!(delta.snapshot.seq(), array.delta_seq());

        let header = read_header(&writer.finish());
        assert_eq!(header.current, array.delta_seq().raw());
        assert_eq!(header.previous, -1);
        assert_eq!(header.changed_count, 3);
        assert!(array.items().iter().all(|item| !item.id().is_none()));
    }

    #[test]
    fn unchanged_array_writes_nothing() {
        let mut array = array_of(&[1, 2]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());

        let mut writer = BitVecWriter::new();
        let outcome =
            encode_delta(&mut array, Some(&first.snapshot), PeerRole::Authority, &mut writer)
                .unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert!(writer.is_empty());
    }

    #[test]
    fn only_modified_items_are_changed() {
        let mut array = array_of(&[1, 2, 3]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());

        array.modify(1, |v| v.0 = 99);
        let mut writer = BitVecWriter::new();
        let second = written(
            encode_delta(&mut array, Some(&first.snapshot), PeerRole::Authority, &mut writer)
                .unwrap(),
        );
        assert_eq!(second.changed, 1);
        assert_eq!(second.deleted, 0);
        let header = read_header(&writer.finish());
        assert_eq!(header.previous, first.snapshot.seq().raw());
    }

    #[test]
    fn deleted_budget_emits_exactly_missing_ids() {
        let mut array = array_of(&[1, 2, 3, 4, 5]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());
        let removed: Vec<u32> = [1, 3].iter().map(|&i| array.items()[i].id().raw()).collect();

        array.remove(3);
        array.remove(1);
        let mut writer = BitVecWriter::new();
        let second = written(
            encode_delta(&mut array, Some(&first.snapshot), PeerRole::Authority, &mut writer)
                .unwrap(),
        );
        assert_eq!(second.deleted, 2);
        assert_eq!(second.changed, 0);
        let mut header = read_header(&writer.finish()).deleted;
        header.sort_unstable();
        assert_eq!(header, removed);
    }

    #[test]
    fn replaced_item_counts_toward_budget() {
        let mut array = array_of(&[1, 2]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());
        let gone = array.items()[0].id();

        array.swap_remove(0);
        array.push(Value(3));
        let mut writer = BitVecWriter::new();
        let second = written(
            encode_delta(&mut array, Some(&first.snapshot), PeerRole::Authority, &mut writer)
                .unwrap(),
        );
        assert_eq!(second.changed, 1);
        assert_eq!(read_header(&writer.finish()).deleted, vec![gone.raw()]);
    }

    #[test]
    fn resend_forces_matching_versions() {
        let mut array = array_of(&[1, 2, 3]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());
        let forced = array.items()[2].id();

        let resend = BTreeSet::from([forced]);
        let mut writer = BitVecWriter::new();
        let second = written(
            encode_delta_with_resend(
                &mut array,
                Some(&first.snapshot),
                &resend,
                PeerRole::Authority,
                &mut writer,
            )
            .unwrap(),
        );
        assert_eq!(second.changed_ids, vec![forced]);
        assert_eq!(second.deleted, 0);
        let header = read_header(&writer.finish());
        assert_eq!(header.changed_count, 1);
        assert!(header.deleted.is_empty());
    }

    #[test]
    fn resend_of_removed_item_is_ignored() {
        let mut array = array_of(&[1, 2]);
        let mut writer = BitVecWriter::new();
        let first = written(encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap());
        let gone = array.items()[1].id();
        array.remove(1);

        let resend = BTreeSet::from([gone]);
        let mut writer = BitVecWriter::new();
        let second = written(
            encode_delta_with_resend(
                &mut array,
                Some(&first.snapshot),
                &resend,
                PeerRole::Authority,
                &mut writer,
            )
            .unwrap(),
        );
        assert!(second.changed_ids.is_empty());
        assert_eq!(read_header(&writer.finish()).deleted, vec![gone.raw()]);
    }

    #[test]
    fn restricted_role_skips_unassigned_items() {
        let mut array = array_of(&[1, 2]);
        array.assign_identity_if_needed(0);
        let mut writer = BitVecWriter::new();
        let delta =
            written(encode_delta(&mut array, None, PeerRole::Restricted, &mut writer).unwrap());
        assert_eq!(delta.changed, 1);
        assert!(array.items()[1].id().is_none());
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut a = array_of(&[4, 5, 6]);
        let mut b = array_of(&[4, 5, 6]);
        let mut wa = BitVecWriter::new();
        let mut wb = BitVecWriter::new();
        encode_delta(&mut a, None, PeerRole::Authority, &mut wa).unwrap();
        encode_delta(&mut b, None, PeerRole::Authority, &mut wb).unwrap();
        assert_eq!(wa.finish(), wb.finish());
    }

    #[test]
    fn payload_errors_propagate() {
        struct Broken;
        impl ItemEncode for Broken {
            fn encode(&self, _writer: &mut BitVecWriter) -> CodecResult<()> {
                Err(CodecError::InvalidPayload { reason: "broken" })
            }
        }
        let mut array = NetArray::new();
        array.push(Broken);
        let mut writer = BitVecWriter::new();
        let err = encode_delta(&mut array, None, PeerRole::Authority, &mut writer).unwrap_err();
        assert_eq!(err, CodecError::InvalidPayload { reason: "broken" });
    }
}
