//! Deferred reference tracking.
//!
//! Item payloads may reference objects the receiving side cannot resolve
//! yet. While decoding, the item codec resolves handles through a
//! [`RefContext`], which records every handle that was unresolved or that
//! resolved to a dynamically allocated object. Items with such handles get
//! a [`RefRecord`] holding the handle sets plus the exact payload bits, so
//! the payload can be decoded again once more handles resolve.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{ItemId, RefHandle};

/// The authority that knows which reference handles are resolvable.
pub trait ReferenceResolver {
    /// The resolved object type handed to item codecs.
    type Object;

    /// Returns `true` if the handle can never resolve.
    fn is_broken(&self, handle: RefHandle) -> bool;

    /// Resolves a handle, if its object is currently known.
    fn resolve(&self, handle: RefHandle) -> Option<Self::Object>;

    /// Returns `true` if the handle names a dynamically allocated object
    /// that may later go away again.
    fn is_dynamic(&self, handle: RefHandle) -> bool;
}

/// Resolver for item types that carry no references.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    type Object = ();

    fn is_broken(&self, _handle: RefHandle) -> bool {
        true
    }

    fn resolve(&self, _handle: RefHandle) -> Option<Self::Object> {
        None
    }

    fn is_dynamic(&self, _handle: RefHandle) -> bool {
        false
    }
}

/// Handles touched by one payload decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedRefs {
    /// Handles that could not be resolved.
    pub unresolved: BTreeSet<RefHandle>,
    /// Handles that resolved to dynamically allocated objects.
    pub dynamic: BTreeSet<RefHandle>,
}

impl TrackedRefs {
    /// Returns `true` if no handle needs tracking.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty() && self.dynamic.is_empty()
    }
}

/// Resolution context handed to item codecs during decode.
pub struct RefContext<'a, R: ReferenceResolver + ?Sized> {
    resolver: &'a R,
    tracked: TrackedRefs,
}

impl<'a, R: ReferenceResolver + ?Sized> RefContext<'a, R> {
    /// Creates an empty context over a resolver.
    pub fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            tracked: TrackedRefs::default(),
        }
    }

    /// Resolves a handle and records it if it needs tracking.
    ///
    /// Unresolvable handles that are not broken are recorded as unresolved.
    /// Resolved handles are recorded only if they are dynamic.
    pub fn resolve(&mut self, handle: RefHandle) -> Option<R::Object> {
        if let Some(object) = self.resolver.resolve(handle) {
            if self.resolver.is_dynamic(handle) {
                self.tracked.dynamic.insert(handle);
            }
            return Some(object);
        }
        if !self.resolver.is_broken(handle) {
            self.tracked.unresolved.insert(handle);
        }
        None
    }

    /// Returns the resolver this context wraps.
    pub fn resolver(&self) -> &'a R {
        self.resolver
    }

    /// Returns the handles tracked so far.
    pub fn tracked(&self) -> &TrackedRefs {
        &self.tracked
    }

    /// Consumes the context, returning the tracked handles.
    pub fn into_tracked(self) -> TrackedRefs {
        self.tracked
    }
}

/// Exact payload bits saved for a later re-decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedPayload {
    /// Packed payload bits, starting at bit zero.
    pub bytes: Vec<u8>,
    /// Number of meaningful bits in `bytes`.
    pub bits: usize,
}

/// Tracking state for one item with outstanding references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefRecord {
    pub(crate) refs: TrackedRefs,
    pub(crate) payload: SavedPayload,
}

impl RefRecord {
    /// Handles still waiting to resolve.
    pub fn unresolved(&self) -> &BTreeSet<RefHandle> {
        &self.refs.unresolved
    }

    /// Resolved handles to dynamic objects.
    pub fn dynamic(&self) -> &BTreeSet<RefHandle> {
        &self.refs.dynamic
    }

    /// The payload bits this record re-decodes from.
    pub fn payload(&self) -> &SavedPayload {
        &self.payload
    }

    /// Returns `true` if neither handle set holds anything.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Per-array table of [`RefRecord`]s keyed by item identity.
///
/// Records refer to items weakly: they are dropped when their item is
/// removed or when their identity no longer maps to a live position.
#[derive(Debug, Clone, Default)]
pub struct RefTable {
    records: BTreeMap<ItemId, RefRecord>,
}

impl RefTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items with outstanding references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no item is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record for an item, if tracked.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&RefRecord> {
        self.records.get(&id)
    }

    /// Iterates records in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &RefRecord)> {
        self.records.iter().map(|(id, record)| (*id, record))
    }

    /// Returns `true` if any record still waits on an unresolved handle.
    #[must_use]
    pub fn has_unresolved(&self) -> bool {
        self.records
            .values()
            .any(|record| !record.refs.unresolved.is_empty())
    }

    /// Every unresolved and resolved-dynamic handle held by any record.
    #[must_use]
    pub fn gather_handles(&self) -> BTreeSet<RefHandle> {
        let mut handles = BTreeSet::new();
        for record in self.records.values() {
            handles.extend(record.refs.unresolved.iter().copied());
            handles.extend(record.refs.dynamic.iter().copied());
        }
        handles
    }

    /// Total bytes of saved payloads held for deferred decodes.
    #[must_use]
    pub fn tracked_bytes(&self) -> usize {
        self.records
            .values()
            .map(|record| record.payload.bytes.len())
            .sum()
    }

    /// Moves a resolved dynamic handle back to unresolved in every record
    /// that holds it. Returns `true` if any record held it.
    pub fn mark_unresolved(&mut self, handle: RefHandle) -> bool {
        let mut found = false;
        for record in self.records.values_mut() {
            if record.refs.dynamic.remove(&handle) {
                record.refs.unresolved.insert(handle);
                found = true;
            }
        }
        if found {
            log::trace!("reference {handle:?} moved back to unresolved");
        }
        found
    }

    /// Stores the handles and payload from a fresh decode of `id`.
    ///
    /// Returns `true` if the record's handle sets changed.
    pub(crate) fn record_decode(
        &mut self,
        id: ItemId,
        refs: TrackedRefs,
        payload: SavedPayload,
    ) -> bool {
        let record = self.records.entry(id).or_default();
        let changed = record.refs != refs;
        if changed {
            log::trace!(
                "item {} tracks {} unresolved, {} dynamic references",
                id.raw(),
                refs.unresolved.len(),
                refs.dynamic.len()
            );
            record.refs = refs;
        }
        record.payload = payload;
        changed
    }

    pub(crate) fn insert(&mut self, id: ItemId, record: RefRecord) {
        self.records.insert(id, record);
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Option<RefRecord> {
        self.records.remove(&id)
    }

    pub(crate) fn ids(&self) -> Vec<ItemId> {
        self.records.keys().copied().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}
