use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use bitstream::{BitReader, BitVecWriter};
use netarray::{
    decode_delta, encode_delta, update_unresolved, ArrayEvent, CodecResult, DeltaLimits,
    ItemDecode, ItemEncode, ItemId, NetArray, PeerRole, RefContext, RefHandle, ReferenceResolver,
    WriteOutcome,
};

/// Objects the observer knows about, filled in as they are spawned.
#[derive(Default)]
struct Registry {
    objects: RefCell<HashMap<u64, String>>,
    dynamic: RefCell<BTreeSet<u64>>,
    destroyed: RefCell<BTreeSet<u64>>,
}

impl Registry {
    fn spawn(&self, handle: u64, name: &str, dynamic: bool) {
        self.objects.borrow_mut().insert(handle, name.to_owned());
        if dynamic {
            self.dynamic.borrow_mut().insert(handle);
        }
    }

    fn destroy(&self, handle: u64) {
        self.objects.borrow_mut().remove(&handle);
        self.destroyed.borrow_mut().insert(handle);
    }
}

impl ReferenceResolver for Registry {
    type Object = String;

    fn is_broken(&self, handle: RefHandle) -> bool {
        self.destroyed.borrow().contains(&handle.raw())
    }

    fn resolve(&self, handle: RefHandle) -> Option<String> {
        self.objects.borrow().get(&handle.raw()).cloned()
    }

    fn is_dynamic(&self, handle: RefHandle) -> bool {
        self.dynamic.borrow().contains(&handle.raw())
    }
}

/// Host side: an attachment naming its owner by handle.
#[derive(Debug, Clone)]
struct Attachment {
    slot: u8,
    owner: u64,
}

impl ItemEncode for Attachment {
    fn encode(&self, writer: &mut BitVecWriter) -> CodecResult<()> {
        writer.write_bits(u64::from(self.slot), 3)?;
        writer.write_bits(self.owner, 24)?;
        Ok(())
    }
}

/// Observer side: the owner is resolved to a name when possible.
#[derive(Debug, Clone, Default, PartialEq)]
struct AttachmentView {
    slot: u8,
    owner: Option<String>,
}

impl ItemDecode<Registry> for AttachmentView {
    fn decode(
        &mut self,
        reader: &mut BitReader<'_>,
        refs: &mut RefContext<'_, Registry>,
    ) -> CodecResult<()> {
        self.slot = reader.read_bits(3)? as u8;
        let handle = RefHandle::new(reader.read_bits(24)?);
        self.owner = refs.resolve(handle);
        Ok(())
    }
}

struct Link {
    host: NetArray<Attachment>,
    observer: NetArray<AttachmentView>,
    acked: Option<netarray::AckSnapshot>,
    events: Vec<ArrayEvent>,
}

impl Link {
    fn new() -> Self {
        Self {
            host: NetArray::new(),
            observer: NetArray::new(),
            acked: None,
            events: Vec::new(),
        }
    }

    fn sync(&mut self, registry: &Registry) {
        let mut writer = BitVecWriter::new();
        let outcome = encode_delta(
            &mut self.host,
            self.acked.as_ref(),
            PeerRole::Authority,
            &mut writer,
        )
        .unwrap();
        if let WriteOutcome::Written(delta) = outcome {
            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);
            decode_delta(
                &mut self.observer,
                &mut reader,
                registry,
                &mut self.events,
                &DeltaLimits::default(),
            )
            .unwrap();
            self.acked = Some(delta.snapshot);
        }
    }
}

#[test]
fn pending_item_refreshes_once_resolved() {
    let registry = Registry::default();
    registry.spawn(1, "crate", false);
    let mut link = Link::new();
    link.host.push(Attachment { slot: 1, owner: 1 });
    link.host.push(Attachment { slot: 2, owner: 77 });
    link.sync(&registry);

    assert_eq!(link.observer.len(), 2);
    assert_eq!(
        link.observer.get(1),
        Some(&AttachmentView {
            slot: 2,
            owner: None
        })
    );
    let record = link.observer.refs().get(ItemId::new(2)).unwrap();
    assert!(record.unresolved().contains(&RefHandle::new(77)));
    // Two 27-bit payloads: the second starts mid-byte.
    assert_eq!(record.payload().bits, 27);
    assert!(link.observer.refs().get(ItemId::new(1)).is_none());

    link.events.clear();
    registry.spawn(77, "barrel", false);
    let outcome = update_unresolved(&mut link.observer, &registry, &mut link.events).unwrap();
    assert_eq!(outcome.remapped, 1);
    assert!(!outcome.more_pending);
    assert_eq!(
        link.observer.get(1),
        Some(&AttachmentView {
            slot: 2,
            owner: Some("barrel".to_owned())
        })
    );
    assert_eq!(
        link.events,
        vec![ArrayEvent::Changed {
            id: ItemId::new(2),
            index: 1
        }]
    );
    assert!(link.observer.refs().is_empty());
}

#[test]
fn broken_reference_is_forgotten() {
    let registry = Registry::default();
    let mut link = Link::new();
    link.host.push(Attachment { slot: 0, owner: 5 });
    link.sync(&registry);
    assert!(link.observer.refs().has_unresolved());

    registry.destroy(5);
    link.events.clear();
    let outcome = update_unresolved(&mut link.observer, &registry, &mut link.events).unwrap();
    assert_eq!(outcome.remapped, 0);
    assert!(!outcome.more_pending);
    assert!(link.events.is_empty());
    assert!(link.observer.refs().is_empty());
}

#[test]
fn dynamic_reference_can_be_unmapped_again() {
    let registry = Registry::default();
    registry.spawn(9, "cart", true);
    let mut link = Link::new();
    link.host.push(Attachment { slot: 4, owner: 9 });
    link.sync(&registry);

    let record = link.observer.refs().get(ItemId::new(1)).unwrap();
    assert!(record.unresolved().is_empty());
    assert!(record.dynamic().contains(&RefHandle::new(9)));
    assert!(!link.observer.refs().has_unresolved());

    registry.objects.borrow_mut().remove(&9);
    assert!(link.observer.mark_reference_unresolved(RefHandle::new(9)));
    assert!(link.observer.refs().has_unresolved());

    registry.spawn(9, "new cart", true);
    let outcome = update_unresolved(&mut link.observer, &registry, &mut ()).unwrap();
    assert_eq!(outcome.remapped, 1);
    assert_eq!(
        link.observer.get(0).and_then(|view| view.owner.as_deref()),
        Some("new cart")
    );
}

#[test]
fn resent_item_without_pending_references_drops_record() {
    let registry = Registry::default();
    let mut link = Link::new();
    link.host.push(Attachment { slot: 3, owner: 40 });
    link.sync(&registry);
    assert_eq!(link.observer.refs().len(), 1);

    registry.spawn(41, "anvil", false);
    link.host.modify(0, |item| item.owner = 41);
    link.sync(&registry);
    assert!(link.observer.refs().is_empty());
    assert_eq!(
        link.observer.get(0).and_then(|view| view.owner.as_deref()),
        Some("anvil")
    );
}

#[test]
fn deleted_item_takes_its_record_along() {
    let registry = Registry::default();
    let mut link = Link::new();
    link.host.push(Attachment { slot: 1, owner: 60 });
    link.host.push(Attachment { slot: 2, owner: 61 });
    link.sync(&registry);
    assert_eq!(link.observer.refs().len(), 2);

    link.host.remove(0);
    link.sync(&registry);
    assert_eq!(link.observer.len(), 1);
    assert_eq!(link.observer.refs().len(), 1);
    assert!(link.observer.refs().get(ItemId::new(1)).is_none());
}

#[test]
fn gathered_handles_cover_every_record() {
    let registry = Registry::default();
    registry.spawn(3, "wagon", true);
    let mut link = Link::new();
    link.host.push(Attachment { slot: 0, owner: 3 });
    link.host.push(Attachment { slot: 1, owner: 8 });
    link.host.push(Attachment { slot: 2, owner: 8 });
    link.sync(&registry);

    let handles: Vec<u64> = link
        .observer
        .refs()
        .gather_handles()
        .into_iter()
        .map(RefHandle::raw)
        .collect();
    assert_eq!(handles, vec![3, 8]);
    assert_eq!(link.observer.refs().tracked_bytes(), 3 * 4);
}
