#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes drive a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 5;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = (data[idx - 1] % 64).saturating_add(1);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.align_to_byte();
            }
            3 => {
                let _ = reader.read_u32();
            }
            _ => {
                let end = reader.bit_position();
                let start = end.saturating_sub(usize::from(data[idx - 1]));
                if let Ok(span) = reader.copy_span(start, end) {
                    assert_eq!(span.len(), (end - start).div_ceil(8));
                }
            }
        }
    }
});
