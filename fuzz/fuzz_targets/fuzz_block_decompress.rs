#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parallel_bzip2::decompress_block;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    data: Vec<u8>,
    start_bit: u64,
    end_bit: u64,
}

fuzz_target!(|input: FuzzInput| {
    if input.data.is_empty() || input.data.len() > 1_000_000 {
        return;
    }

    let max_bits = (input.data.len() as u64) * 8;

    let start_bit = input.start_bit % (max_bits + 1);
    let end_bit = input.end_bit % (max_bits + 1);

    let (start_bit, end_bit) = if start_bit <= end_bit {
        (start_bit, end_bit)
    } else {
        (end_bit, start_bit)
    };

    // Should either succeed or return a typed error, never panic.
    let _ = decompress_block(&input.data, start_bit, end_bit);

    if start_bit == end_bit {
        let _ = decompress_block(&input.data, start_bit, start_bit);
    }

    if end_bit == max_bits {
        let _ = decompress_block(&input.data, start_bit, max_bits);
    }
});
