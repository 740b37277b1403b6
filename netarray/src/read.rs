//! Applying received delta records.

use bitstream::BitReader;

use crate::array::NetArray;
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::item::{ItemDecode, NetItem};
use crate::limits::DeltaLimits;
use crate::observer::ArrayObserver;
use crate::refs::{RefContext, ReferenceResolver, SavedPayload};
use crate::types::{DeltaSeq, ItemId};

/// Summary of one applied record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// The sender's sequence stamped on the record.
    pub sequence: DeltaSeq,
    /// The acknowledged sequence the record was diffed against.
    pub previous: DeltaSeq,
    /// Items appended by this record.
    pub added: usize,
    /// Existing items updated by this record.
    pub changed: usize,
    /// Items removed, explicitly or as stale.
    pub removed: usize,
    /// Some tracked item still waits on an unresolved reference.
    pub has_unresolved: bool,
    /// Some item's tracked reference sets changed.
    pub reference_lists_changed: bool,
}

/// Applies one delta record to `array`.
///
/// Counts above `limits` are rejected before any item is touched. A
/// payload failure aborts mid-record and leaves the items applied so far
/// in place. Either failure marks the array desynchronized: later calls
/// return [`CodecError::Desynchronized`] until [`NetArray::reset`].
///
/// Notifications fire in order: removals, additions, changes. Removal
/// indices refer to positions before anything is removed.
pub fn decode_delta<P, R, O>(
    array: &mut NetArray<P>,
    reader: &mut BitReader<'_>,
    resolver: &R,
    observer: &mut O,
    limits: &DeltaLimits,
) -> CodecResult<DecodeOutcome>
where
    P: ItemDecode<R> + Default,
    R: ReferenceResolver + ?Sized,
    O: ArrayObserver<P> + ?Sized,
{
    if array.desynchronized {
        return Err(CodecError::Desynchronized);
    }
    let result = apply_record(array, reader, resolver, observer, limits);
    if let Err(err) = &result {
        log::warn!("delta record rejected, array desynchronized: {err}");
        array.desynchronized = true;
    }
    result
}

fn apply_record<P, R, O>(
    array: &mut NetArray<P>,
    reader: &mut BitReader<'_>,
    resolver: &R,
    observer: &mut O,
    limits: &DeltaLimits,
) -> CodecResult<DecodeOutcome>
where
    P: ItemDecode<R> + Default,
    R: ReferenceResolver + ?Sized,
    O: ArrayObserver<P> + ?Sized,
{
    array.positions.ensure(&array.items);

    let sequence = DeltaSeq::new(reader.read_i32()?);
    let previous = DeltaSeq::new(reader.read_i32()?);
    let deleted_count = reader.read_u32()? as usize;
    if deleted_count > limits.max_deleted {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Deleted,
            limit: limits.max_deleted,
            actual: deleted_count,
        });
    }
    let changed_count = reader.read_u32()? as usize;
    if changed_count > limits.max_changed {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Changed,
            limit: limits.max_changed,
            actual: changed_count,
        });
    }

    let mut removed = Vec::new();
    for _ in 0..deleted_count {
        let id = ItemId::new(reader.read_u32()?);
        array.refs.remove(id);
        if let Some(index) = array.positions.get(id) {
            removed.push(index);
        }
    }

    let mut added = Vec::new();
    let mut changed = Vec::new();
    let mut reference_lists_changed = false;
    for _ in 0..changed_count {
        let raw = reader.read_u32()?;
        let id = ItemId::new(raw);
        if id.is_none() {
            return Err(CodecError::InvalidItemId { raw });
        }

        let index = if let Some(index) = array.positions.get(id) {
            changed.push(index);
            index
        } else {
            let mut item = NetItem::new(P::default());
            item.meta.id = id;
            array.items.push(item);
            let index = array.items.len() - 1;
            array.positions.insert(id, index);
            added.push(index);
            index
        };

        let item = &mut array.items[index];
        item.meta.last_seen = sequence;
        item.meta.version = item.meta.version.next();

        let start = reader.bit_position();
        let mut refs = RefContext::new(resolver);
        item.value.decode(reader, &mut refs)?;
        let tracked = refs.into_tracked();

        if tracked.is_empty() {
            reference_lists_changed |= array.refs.remove(id).is_some();
        } else {
            let end = reader.bit_position();
            let payload = SavedPayload {
                bytes: reader.copy_span(start, end)?,
                bits: end - start,
            };
            reference_lists_changed |= array.refs.record_decode(id, tracked, payload);
        }
    }

    for (index, item) in array.items.iter().enumerate() {
        let seen = item.meta.last_seen;
        if seen < sequence && seen > previous {
            removed.push(index);
        }
    }
    removed.sort_unstable();
    removed.dedup();

    if !removed.is_empty() || changed_count > 0 {
        array.bump_sequence();
    }

    for &index in &removed {
        if let Some(item) = array.items.get(index) {
            observer.on_removed(item, index);
        }
    }
    for &index in &added {
        observer.on_added(&array.items[index], index);
    }
    for &index in &changed {
        observer.on_changed(&array.items[index], index);
    }

    if !removed.is_empty() {
        for &index in &removed {
            if let Some(item) = array.items.get(index) {
                array.refs.remove(item.meta.id);
            }
        }
        swap_remove_positions(&mut array.items, &removed);
        array.positions.invalidate();
    }

    let outcome = DecodeOutcome {
        sequence,
        previous,
        added: added.len(),
        changed: changed.len(),
        removed: removed.len(),
        has_unresolved: array.refs.has_unresolved(),
        reference_lists_changed,
    };
    log::debug!(
        "applied delta {} -> {}: {} added, {} changed, {} removed",
        previous.raw(),
        sequence.raw(),
        outcome.added,
        outcome.changed,
        outcome.removed
    );
    Ok(outcome)
}

/// Removes `positions` (sorted ascending, unique) from highest to lowest,
/// each by moving the last element into the vacated slot.
pub(crate) fn swap_remove_positions<T>(items: &mut Vec<T>, positions: &[usize]) {
    for &index in positions.iter().rev() {
        if index < items.len() {
            items.swap_remove(index);
        }
    }
}
