//! Change notifications fired while applying deltas.

use crate::item::NetItem;
use crate::types::ItemId;

/// Receives add/remove/change notifications from the receiving side.
///
/// Indices are positions in the array at notification time. Removal
/// notifications fire before the items are physically removed.
pub trait ArrayObserver<P> {
    fn on_added(&mut self, _item: &NetItem<P>, _index: usize) {}

    fn on_removed(&mut self, _item: &NetItem<P>, _index: usize) {}

    fn on_changed(&mut self, _item: &NetItem<P>, _index: usize) {}
}

impl<P> ArrayObserver<P> for () {}

/// A recorded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayEvent {
    Added { id: ItemId, index: usize },
    Removed { id: ItemId, index: usize },
    Changed { id: ItemId, index: usize },
}

impl<P> ArrayObserver<P> for Vec<ArrayEvent> {
    fn on_added(&mut self, item: &NetItem<P>, index: usize) {
        self.push(ArrayEvent::Added {
            id: item.id(),
            index,
        });
    }

    fn on_removed(&mut self, item: &NetItem<P>, index: usize) {
        self.push(ArrayEvent::Removed {
            id: item.id(),
            index,
        });
    }

    fn on_changed(&mut self, item: &NetItem<P>, index: usize) {
        self.push(ArrayEvent::Changed {
            id: item.id(),
            index,
        });
    }
}
