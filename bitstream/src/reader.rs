//! Bit-level reader with bounded operations.

use crate::error::{BitError, BitResult};

/// A bit-level reader for decoding packed binary data.
///
/// All read operations are bounds-checked and return errors on failure.
/// The reader never panics on malformed input.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_len: usize,
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a new `BitReader` over every bit of a byte slice.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_len: data.len().saturating_mul(8),
            bit_pos: 0,
        }
    }

    /// Creates a reader limited to the first `bits` bits of `data`.
    ///
    /// `bits` is clamped to the number of bits the slice actually holds.
    #[must_use]
    pub const fn with_bit_len(data: &'a [u8], bits: usize) -> Self {
        let available = data.len().saturating_mul(8);
        let bit_len = if bits < available { bits } else { available };
        Self {
            data,
            bit_len,
            bit_pos: 0,
        }
    }

    /// Returns the number of bits remaining to read.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.bit_len.saturating_sub(self.bit_pos)
    }

    /// Returns `true` if there are no more bits to read.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Returns the current bit position.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Returns the total number of readable bits.
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Reads a single bit as a boolean.
    pub fn read_bit(&mut self) -> BitResult<bool> {
        if self.bits_remaining() == 0 {
            return Err(BitError::UnexpectedEof {
                requested: 1,
                available: 0,
            });
        }
        let bit = self.bit_at(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Reads up to 64 bits as an unsigned integer.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits == 0 {
            return Ok(0);
        }
        self.ensure_bits(bits as usize)?;

        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Reads a fixed-width 32-bit unsigned integer.
    pub fn read_u32(&mut self) -> BitResult<u32> {
        self.ensure_bits(32)?;
        let mut value = 0u32;
        for _ in 0..32 {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Reads a fixed-width 32-bit signed integer (two's complement).
    pub fn read_i32(&mut self) -> BitResult<i32> {
        self.read_u32().map(|value| value as i32)
    }

    /// Skips to the next byte boundary.
    pub fn align_to_byte(&mut self) -> BitResult<()> {
        let rem = self.bit_pos % 8;
        if rem == 0 {
            return Ok(());
        }
        let skip = 8 - rem;
        self.ensure_bits(skip)?;
        self.bit_pos += skip;
        Ok(())
    }

    /// Copies the bits in `start..end` into a freshly packed buffer.
    ///
    /// The returned buffer starts at bit zero, so it can be fed back to
    /// [`BitReader::with_bit_len`] with `end - start` bits.
    pub fn copy_span(&self, start: usize, end: usize) -> BitResult<Vec<u8>> {
        if start > end || end > self.bit_len {
            return Err(BitError::InvalidSpan {
                start,
                end,
                bit_len: self.bit_len,
            });
        }
        let len = end - start;
        let mut out = vec![0u8; len.div_ceil(8)];
        for offset in 0..len {
            if self.bit_at(start + offset) {
                out[offset / 8] |= 0x80 >> (offset % 8);
            }
        }
        Ok(out)
    }

    fn bit_at(&self, pos: usize) -> bool {
        (self.data[pos / 8] >> (7 - pos % 8)) & 1 == 1
    }

    fn ensure_bits(&self, bits: usize) -> BitResult<()> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(BitError::UnexpectedEof {
                requested: bits,
                available,
            });
        }
        Ok(())
    }
}
