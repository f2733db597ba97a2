//! Adapter realizing the opaque block-codec contract (init/retrieve/work/
//! emit/destroy) on top of the third-party `bzip2` crate.
//!
//! The scanner already delimits a block's raw bits by locating the magic
//! that starts the *next* block (or the stream trailer); decoding one
//! block is then just: prepend a synthetic minimal stream header so the
//! payload looks like a complete one-block bzip2 file, and drive the
//! crate's streaming reader to completion. The final block of a stream
//! has no trailing EOS marker once re-wrapped this way, so an
//! `UnexpectedEof` there is expected, not an error.

use bzip2::read::BzDecoder;
use std::io::Read;

use crate::error::{Error, Result};

/// Maximum size of a single decompressed slice handed to the muxer.
pub const SUB_BLOCK_BYTES: usize = 1024 * 1024;

pub struct DecodedBlock {
    pub data: Vec<u8>,
    pub crc: u32,
    /// This block's own effective bs100k.
    ///
    /// The real codec's `work()` step derives this from the decoder's own
    /// internal Huffman/MTF state as it unpacks the block, since a bzip2
    /// block never stores its size directly. The `bzip2` crate doesn't
    /// expose that internal state, so it's recovered the same way the
    /// format bounds it in the first place: a block's decompressed length
    /// can never exceed `bs100k1 * 100_000` bytes, so the smallest digit
    /// satisfying that bound is this block's effective bs100k1.
    pub bs100k1: u8,
}

/// Smallest `n` in `1..=9` with `n * 100_000 >= len`, the block-size digit
/// a block of this decompressed length could have come from at the
/// smallest.
fn bs100k1_for_len(len: usize) -> u8 {
    let n = (len + BLOCK_QUANTUM - 1) / BLOCK_QUANTUM;
    n.clamp(1, 9) as u8
}

const BLOCK_QUANTUM: usize = 100_000;

/// Decode one block's raw compressed bits (as delimited by the scanner,
/// starting at its own magic) into plaintext plus its CRC.
pub fn decode_block(payload: &[u8]) -> Result<DecodedBlock> {
    let mut scratch = Vec::with_capacity(4 + payload.len());
    scratch.extend_from_slice(b"BZh9");
    scratch.extend_from_slice(payload);

    let mut data = Vec::new();
    let mut decoder = BzDecoder::new(&scratch[..]);
    match decoder.read_to_end(&mut data) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {}
        Err(e) => return Err(Error::DataError(e.to_string())),
    }
    let crc = crc32_bzip2(&data);
    let bs100k1 = bs100k1_for_len(data.len());
    Ok(DecodedBlock { data, crc, bs100k1 })
}

/// Split a block's plaintext into `<= SUB_BLOCK_BYTES` slices.
pub fn split_sub_blocks(data: Vec<u8>) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(SUB_BLOCK_BYTES).map(|c| c.to_vec()).collect()
}

/// CRC-32/BZIP2: MSB-first, poly 0x04C11DB7, init/final complement
/// 0xFFFFFFFF — the per-block CRC bzip2 folds into its stream CRC via
/// `rotl(crc, 1) ^ block_crc`.
pub fn crc32_bzip2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc ^ 0xFFFF_FFFF
}

pub fn fold_stream_crc(stream_crc: u32, block_crc: u32) -> u32 {
    stream_crc.rotate_left(1) ^ block_crc
}
