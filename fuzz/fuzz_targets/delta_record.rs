#![no_main]

use bitstream::{BitReader, BitVecWriter};
use libfuzzer_sys::fuzz_target;
use netarray::{
    decode_delta, encode_delta, update_unresolved, CodecResult, DeltaLimits, ItemDecode,
    ItemEncode, NetArray, PeerRole, RefContext, RefHandle, ReferenceResolver, WriteOutcome,
};

/// Handles below 16 resolve, even handles are dynamic, and 255 is broken.
struct Resolver;

impl ReferenceResolver for Resolver {
    type Object = u64;

    fn is_broken(&self, handle: RefHandle) -> bool {
        handle.raw() == 255
    }

    fn resolve(&self, handle: RefHandle) -> Option<u64> {
        (handle.raw() < 16).then_some(handle.raw())
    }

    fn is_dynamic(&self, handle: RefHandle) -> bool {
        handle.raw() % 2 == 0
    }
}

#[derive(Debug, Clone, Default)]
struct Item {
    flags: u8,
    target: Option<u64>,
}

impl ItemEncode for Item {
    fn encode(&self, writer: &mut BitVecWriter) -> CodecResult<()> {
        writer.write_bits(u64::from(self.flags), 5)?;
        writer.write_bits(self.target.unwrap_or(0), 8)?;
        Ok(())
    }
}

impl ItemDecode<Resolver> for Item {
    fn decode(
        &mut self,
        reader: &mut BitReader<'_>,
        refs: &mut RefContext<'_, Resolver>,
    ) -> CodecResult<()> {
        self.flags = reader.read_bits(5)? as u8;
        self.target = refs.resolve(RefHandle::new(reader.read_bits(8)?));
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let mut array: NetArray<Item> = NetArray::new();
    let mut reader = BitReader::new(data);
    let limits = DeltaLimits::default();
    let mut events = Vec::new();

    // Apply as many back-to-back records as the input holds.
    while !reader.is_empty() {
        if decode_delta(&mut array, &mut reader, &Resolver, &mut events, &limits).is_err() {
            assert!(array.is_desynchronized());
            return;
        }
        if update_unresolved(&mut array, &Resolver, &mut events).is_err() {
            return;
        }
    }

    // Whatever was received must re-encode, and a restricted peer may echo
    // every received item since each one carries an identity.
    let mut writer = BitVecWriter::new();
    let outcome = encode_delta(&mut array, None, PeerRole::Restricted, &mut writer)
        .expect("re-encode received items");
    match outcome {
        WriteOutcome::Written(delta) => assert_eq!(delta.changed, array.len()),
        WriteOutcome::Unchanged => panic!("a first write always emits a record"),
    }
});
