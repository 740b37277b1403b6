//! Bit packing primitives for the netarray delta protocol.
//!
//! This crate provides [`BitVecWriter`] and [`BitReader`] for bit-level encoding and decoding.
//! It is designed for bounded, panic-free operation with explicit error handling.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **No domain knowledge** - This crate knows nothing about arrays, items, or references.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitVecWriter};
//!
//! let mut writer = BitVecWriter::new();
//! writer.write_bit(true);
//! writer.write_bits(42, 7).unwrap();
//! writer.write_i32(-1);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! assert_eq!(reader.read_i32().unwrap(), -1);
//! ```

mod error;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::BitVecWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        let writer = BitVecWriter::new();
        let bytes = writer.finish();
        assert!(bytes.is_empty());

        let reader = BitReader::new(&bytes);
        assert!(reader.is_empty());
    }

    #[test]
    fn bits_roundtrip_various_sizes() {
        let test_cases = [
            (0b1010u64, 4),
            (0xFFu64, 8),
            (0xABCDu64, 16),
            (0x1234_5678u64, 32),
            (u64::MAX, 64),
        ];

        for (value, bits) in test_cases {
            let mut writer = BitVecWriter::new();
            writer.write_bits(value, bits).unwrap();
            let bytes = writer.finish();

            let mut reader = BitReader::new(&bytes);
            let read_value = reader.read_bits(bits).unwrap();
            assert_eq!(
                read_value, value,
                "roundtrip failed for {bits}-bit value {value}"
            );
        }
    }

    #[test]
    fn mixed_roundtrip() {
        let mut writer = BitVecWriter::new();
        writer.write_bit(true);
        writer.write_u32(7);
        writer.write_bits(0b1010, 4).unwrap();
        writer.write_i32(i32::MIN);
        writer.write_bit(false);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
        assert_eq!(reader.read_i32().unwrap(), i32::MIN);
        assert!(!reader.read_bit().unwrap());
    }

    #[test]
    fn span_copy_replays_through_writer() {
        let mut writer = BitVecWriter::new();
        writer.write_bits(0b11, 2).unwrap();
        writer.write_u32(0xDEAD_BEEF);
        writer.write_bit(true);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        reader.read_bits(2).unwrap();
        let start = reader.bit_position();
        reader.read_u32().unwrap();
        let end = reader.bit_position();
        let span = reader.copy_span(start, end).unwrap();

        let mut replay = BitReader::with_bit_len(&span, end - start);
        assert_eq!(replay.read_u32().unwrap(), 0xDEAD_BEEF);
        assert!(replay.is_empty());
    }
}
