//! The replicated array and its identity bookkeeping.

use std::collections::HashMap;

use crate::item::NetItem;
use crate::refs::RefTable;
use crate::types::{DeltaSeq, ItemId, RefHandle};
use crate::write::PeerRole;

/// Identity to position lookup, rebuilt lazily from the item sequence.
///
/// Never patched during bulk removal: any removal invalidates it.
#[derive(Debug, Clone, Default)]
pub(crate) struct PositionCache {
    map: HashMap<ItemId, usize>,
    stale: bool,
}

impl PositionCache {
    pub(crate) fn invalidate(&mut self) {
        self.map.clear();
        self.stale = true;
    }

    /// Rebuilds the map if it is marked stale or its size disagrees with
    /// the number of items.
    pub(crate) fn ensure<P>(&mut self, items: &[NetItem<P>]) {
        if !self.stale && self.map.len() == items.len() {
            return;
        }
        self.map.clear();
        for (index, item) in items.iter().enumerate() {
            if !item.meta.id.is_none() {
                self.map.insert(item.meta.id, index);
            }
        }
        self.stale = false;
    }

    pub(crate) fn get(&self, id: ItemId) -> Option<usize> {
        self.map.get(&id).copied()
    }

    pub(crate) fn insert(&mut self, id: ItemId, index: usize) {
        self.map.insert(id, index);
    }
}

/// An ordered, keyed collection replicated by delta records.
///
/// The host mutates it through the methods below, each of which keeps
/// the delta sequence and the identity bookkeeping current. Observers
/// mutate it only by applying received records.
#[derive(Debug, Clone)]
pub struct NetArray<P> {
    pub(crate) items: Vec<NetItem<P>>,
    pub(crate) id_counter: ItemId,
    pub(crate) delta_seq: DeltaSeq,
    pub(crate) positions: PositionCache,
    cached_len: Option<usize>,
    cached_eligible: Option<(PeerRole, usize)>,
    pub(crate) refs: RefTable,
    pub(crate) desynchronized: bool,
}

impl<P> Default for NetArray<P> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            id_counter: ItemId::new(0),
            delta_seq: DeltaSeq::default(),
            positions: PositionCache::default(),
            cached_len: None,
            cached_eligible: None,
            refs: RefTable::new(),
            desynchronized: false,
        }
    }
}

impl<P> NetArray<P> {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items with their replication bookkeeping, in order.
    #[must_use]
    pub fn items(&self) -> &[NetItem<P>] {
        &self.items
    }

    /// Returns the payload at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&P> {
        self.items.get(index).map(|item| &item.value)
    }

    /// Iterates payloads in order.
    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.items.iter().map(|item| &item.value)
    }

    /// The current delta sequence.
    #[must_use]
    pub const fn delta_seq(&self) -> DeltaSeq {
        self.delta_seq
    }

    /// Outstanding reference tracking for received items.
    #[must_use]
    pub const fn refs(&self) -> &RefTable {
        &self.refs
    }

    /// Returns `true` once a decode or sweep has failed on this array.
    #[must_use]
    pub const fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Returns the position of an item by identity.
    pub fn position_of(&mut self, id: ItemId) -> Option<usize> {
        self.positions.ensure(&self.items);
        self.positions.get(id)
    }

    /// Appends an item. Its identity is assigned on first transmission.
    pub fn push(&mut self, value: P) -> usize {
        self.items.push(NetItem::new(value));
        self.mark_dirty();
        self.items.len() - 1
    }

    /// Inserts an item at `index`, shifting later items.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: P) {
        self.items.insert(index, NetItem::new(value));
        self.mark_dirty();
    }

    /// Removes the item at `index`, preserving the order of the rest.
    pub fn remove(&mut self, index: usize) -> Option<P> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.mark_dirty();
        Some(item.value)
    }

    /// Removes the item at `index`, moving the last item into its place.
    pub fn swap_remove(&mut self, index: usize) -> Option<P> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.swap_remove(index);
        self.mark_dirty();
        Some(item.value)
    }

    /// Mutates the item at `index` and marks it dirty.
    pub fn modify<T>(&mut self, index: usize, f: impl FnOnce(&mut P) -> T) -> Option<T> {
        let item = self.items.get_mut(index)?;
        let out = f(&mut item.value);
        self.mark_item_dirty(index);
        Some(out)
    }

    /// Marks the item at `index` changed, assigning its identity if needed.
    ///
    /// Returns `false` if `index` is out of range.
    pub fn mark_item_dirty(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.meta.id.is_none() {
            self.id_counter = self.id_counter.next();
            item.meta.id = self.id_counter;
        }
        item.meta.version = item.meta.version.next();
        self.mark_dirty();
        true
    }

    /// Assigns an identity to the item at `index` if it has none yet.
    ///
    /// Assignment counts as a mutation: the version and delta sequence
    /// advance. Returns the item's identity.
    pub fn assign_identity_if_needed(&mut self, index: usize) -> Option<ItemId> {
        let id = self.items.get(index)?.meta.id;
        if id.is_none() {
            self.mark_item_dirty(index);
            return self.items.get(index).map(NetItem::id);
        }
        Some(id)
    }

    /// Records a content change: invalidates cached lookups and advances
    /// the delta sequence.
    pub fn mark_dirty(&mut self) {
        self.positions.invalidate();
        self.bump_sequence();
    }

    /// Moves a resolved dynamic reference back to unresolved in every
    /// tracking record that holds it.
    pub fn mark_reference_unresolved(&mut self, handle: RefHandle) -> bool {
        self.refs.mark_unresolved(handle)
    }

    /// Drops all items and tracking state and clears the desynchronized
    /// flag. Identities already handed out are not reused.
    pub fn reset(&mut self) {
        self.items.clear();
        self.refs.clear();
        self.desynchronized = false;
        self.mark_dirty();
    }

    pub(crate) fn bump_sequence(&mut self) {
        self.delta_seq = self.delta_seq.next();
        self.cached_len = None;
        self.cached_eligible = None;
    }

    /// Number of items `role` may transmit, cached until the next change.
    pub(crate) fn eligible_count(&mut self, role: PeerRole) -> usize {
        if self.cached_len == Some(self.items.len()) {
            if let Some((cached_role, count)) = self.cached_eligible {
                if cached_role == role {
                    return count;
                }
            }
        }
        let count = self.count_eligible(role);
        self.cached_len = Some(self.items.len());
        self.cached_eligible = Some((role, count));
        count
    }

    pub(crate) fn count_eligible(&self, role: PeerRole) -> usize {
        self.items
            .iter()
            .filter(|item| role.may_write(&item.meta))
            .count()
    }
}
