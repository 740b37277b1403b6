//! Bounded history of sent-but-unacknowledged snapshots.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::error::{CodecError, CodecResult};
use crate::types::SendId;

/// A fixed-capacity window of values keyed by strictly increasing send id.
///
/// When full, inserting drops the oldest entry.
#[derive(Debug, Clone)]
pub struct SnapshotHistory<T> {
    entries: VecDeque<(SendId, T)>,
    capacity: usize,
    last_send: Option<SendId>,
}

impl<T> SnapshotHistory<T> {
    /// Creates an empty history holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
            last_send: None,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records the value sent under `send_id`, returning the entry evicted
    /// to make room, if any.
    ///
    /// Send ids must be strictly increasing, even across evictions.
    pub fn insert(&mut self, send_id: SendId, value: T) -> CodecResult<Option<(SendId, T)>> {
        if let Some(last) = self.last_send {
            if send_id <= last {
                return Err(CodecError::SendOutOfOrder {
                    last: last.raw(),
                    new: send_id.raw(),
                });
            }
        }
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        if let Some((old, _)) = &evicted {
            log::debug!("snapshot history full, evicted send {}", old.raw());
        }
        self.entries.push_back((send_id, value));
        self.last_send = Some(send_id);
        Ok(evicted)
    }

    /// Returns the value recorded for `send_id`, if still held.
    #[must_use]
    pub fn get(&self, send_id: SendId) -> Option<&T> {
        self.entries
            .iter()
            .find(|(id, _)| *id == send_id)
            .map(|(_, value)| value)
    }

    /// Removes and returns the value for `send_id`, discarding every older
    /// entry along with it.
    pub fn take(&mut self, send_id: SendId) -> Option<T> {
        let position = self.entries.iter().position(|(id, _)| *id == send_id)?;
        self.entries.drain(..position);
        self.entries.pop_front().map(|(_, value)| value)
    }

    /// The most recent send id accepted, even if since evicted.
    #[must_use]
    pub fn last_send(&self) -> Option<SendId> {
        self.last_send
    }

    /// Drops every entry. Send ids must still increase afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (SendId, &T)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }
}
