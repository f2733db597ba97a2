use bzip2::write::BzEncoder;
use bzip2::Compression;
use parallel_bzip2::{decompress_reader, Error};
use std::io::Write;

fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = BzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
fn empty_file_is_not_a_valid_bzip2_file() {
    let err = decompress_reader(&b""[..], 2).unwrap_err();
    assert!(matches!(err, Error::NotBzip2));
}

#[test]
fn single_minimal_stream_roundtrips() {
    let plaintext = b"hello\n";
    let compressed = compress(plaintext);
    let out = decompress_reader(&compressed[..], 2).unwrap();
    assert_eq!(out, plaintext);
}

#[test]
fn multi_stream_concatenation_decodes_as_the_concatenated_plaintext() {
    let a = b"the first stream\n".repeat(50);
    let b = b"a completely different second stream\n".repeat(50);
    let mut concatenated = compress(&a);
    concatenated.extend_from_slice(&compress(&b));

    let out = decompress_reader(&concatenated[..], 3).unwrap();
    let mut expected = a.clone();
    expected.extend_from_slice(&b);
    assert_eq!(out, expected);
}

#[test]
fn large_multi_block_stream_matches_reference_across_worker_counts() {
    // Large enough to span several bzip2 blocks (bs100k default ~900 KiB).
    let plaintext: Vec<u8> = (0..3_000_000u32)
        .map(|i| (i % 251) as u8)
        .collect();
    let compressed = compress(&plaintext);

    for &workers in &[1u32, 2, 4, 8] {
        let out = decompress_reader(&compressed[..], workers).unwrap();
        assert_eq!(out, plaintext, "mismatch with {workers} workers");
    }
}

#[test]
fn corrupt_crc_is_rejected() {
    let plaintext = b"some plaintext long enough to compress meaningfully".repeat(20);
    let mut compressed = compress(&plaintext);

    // Flip a bit well inside the compressed payload, after the stream
    // header and block magic, to corrupt the block's Huffman-coded data
    // without accidentally recreating a valid 48-bit magic.
    let flip_at = compressed.len() / 2;
    compressed[flip_at] ^= 0x01;

    let result = decompress_reader(&compressed[..], 2);
    assert!(
        matches!(
            result,
            Err(Error::DataError(_)) | Err(Error::StreamCrcMismatch { .. })
        ),
        "expected a data or CRC error, got {result:?}"
    );
}

#[test]
fn truncated_file_is_rejected() {
    let plaintext = b"truncate me please, this needs to be reasonably long".repeat(10);
    let mut compressed = compress(&plaintext);
    let new_len = compressed.len().saturating_sub(16);
    compressed.truncate(new_len);

    let result = decompress_reader(&compressed[..], 2);
    assert!(result.is_err(), "truncated input must not decode successfully");
}
