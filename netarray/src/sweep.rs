//! Retrying items whose references were unresolved when they arrived.

use bitstream::BitReader;

use crate::array::NetArray;
use crate::error::{CodecError, CodecResult};
use crate::item::ItemDecode;
use crate::observer::ArrayObserver;
use crate::refs::{RefContext, ReferenceResolver};

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Items re-decoded because a handle resolved.
    pub remapped: usize,
    /// Some record still holds unresolved handles; sweep again later.
    pub more_pending: bool,
}

/// Re-examines every tracked item against `resolver`.
///
/// Broken handles are dropped. Handles that now resolve leave the
/// unresolved set, moving to the dynamic set if the resolver says so. An
/// item with at least one newly resolved handle is decoded again from its
/// saved payload and reported through `observer.on_changed`. Records
/// whose item no longer exists, or that end up tracking nothing, are
/// deleted.
///
/// A failed re-decode marks the array desynchronized.
pub fn update_unresolved<P, R, O>(
    array: &mut NetArray<P>,
    resolver: &R,
    observer: &mut O,
) -> CodecResult<SweepOutcome>
where
    P: ItemDecode<R>,
    R: ReferenceResolver + ?Sized,
    O: ArrayObserver<P> + ?Sized,
{
    if array.desynchronized {
        return Err(CodecError::Desynchronized);
    }
    let result = sweep(array, resolver, observer);
    if let Err(err) = &result {
        log::warn!("reference sweep failed, array desynchronized: {err}");
        array.desynchronized = true;
    }
    result
}

fn sweep<P, R, O>(
    array: &mut NetArray<P>,
    resolver: &R,
    observer: &mut O,
) -> CodecResult<SweepOutcome>
where
    P: ItemDecode<R>,
    R: ReferenceResolver + ?Sized,
    O: ArrayObserver<P> + ?Sized,
{
    array.positions.ensure(&array.items);

    let mut remapped = 0;
    for id in array.refs.ids() {
        let Some(index) = array.positions.get(id) else {
            log::trace!("dropping references for departed item {}", id.raw());
            array.refs.remove(id);
            continue;
        };
        let Some(mut record) = array.refs.remove(id) else {
            continue;
        };

        let mut resolved_any = false;
        let handles: Vec<_> = record.refs.unresolved.iter().copied().collect();
        for handle in handles {
            if resolver.is_broken(handle) {
                record.refs.unresolved.remove(&handle);
            } else if resolver.resolve(handle).is_some() {
                record.refs.unresolved.remove(&handle);
                if resolver.is_dynamic(handle) {
                    record.refs.dynamic.insert(handle);
                }
                resolved_any = true;
            }
        }

        if resolved_any {
            let payload = &record.payload;
            let mut reader = BitReader::with_bit_len(&payload.bytes, payload.bits);
            let mut refs = RefContext::new(resolver);
            let item = &mut array.items[index];
            item.value.decode(&mut reader, &mut refs)?;
            observer.on_changed(item, index);
            remapped += 1;
            log::trace!(
                "item {} re-decoded, {} references still unresolved",
                id.raw(),
                record.refs.unresolved.len()
            );
        }

        if !record.is_empty() {
            array.refs.insert(id, record);
        }
    }

    let outcome = SweepOutcome {
        remapped,
        more_pending: array.refs.has_unresolved(),
    };
    if outcome.remapped > 0 {
        log::debug!(
            "reference sweep re-decoded {} items, more pending: {}",
            outcome.remapped,
            outcome.more_pending
        );
    }
    Ok(outcome)
}
