#![no_main]

use libfuzzer_sys::fuzz_target;
use parallel_bzip2::Scanner;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 10_000_000 {
        return;
    }

    let scanner = Scanner::new();
    let mut state = Default::default();
    if let Some((_kind, bit_offset)) = scanner.scan(data, &mut state) {
        assert!(
            bit_offset + 48 <= data.len() as u64 * 8,
            "match extends past the input"
        );
    }

    // A match filtered out by a nonzero floor must never appear below it.
    let mut state2 = Default::default();
    let floor = (data.len() as u64 * 8) / 2;
    if let Some((_kind, bit_offset)) = scanner.scan_from(data, floor, &mut state2) {
        assert!(bit_offset >= floor, "scan_from returned a match below its floor");
    }
});
