//! Parallel bzip2 decompressor.
//!
//! Decompression is split across three kinds of thread, connected by three
//! bounded, condvar-driven queues:
//!
//! 1. **Splitter** — reads fixed-size chunks from the input and publishes
//!    them, throttled by chunk-slot credits so only a bounded number are
//!    ever in flight.
//! 2. **Worker pool** — exactly one worker at a time scans forward through
//!    the unscanned chunk chain locating block boundaries (that part is
//!    inherently sequential); every worker, including the scanning one once
//!    its lineage ends, spends the rest of its time decoding already-located
//!    blocks, which is where the real parallelism comes from.
//! 3. **Muxer** — a single consumer that reassembles decoded sub-blocks in
//!    original order, folds and checks each stream's CRC, and writes
//!    plaintext out.
//!
//! # Quick start
//!
//! ```no_run
//! use parallel_bzip2::Bz2Decoder;
//! use std::io::Read;
//!
//! let mut decoder = Bz2Decoder::open("file.bz2").unwrap();
//! let mut data = Vec::new();
//! decoder.read_to_end(&mut data).unwrap();
//! ```
//!
//! # One-shot decompression
//!
//! ```no_run
//! use parallel_bzip2::decompress_file;
//!
//! let data = decompress_file("file.bz2", 4).unwrap();
//! ```

mod block;
mod chunk;
mod codec;
pub mod decoder;
mod error;
mod ms_queue;
mod muxer;
mod pipeline;
pub mod scanner;
mod splitter;
mod sw_queue;
mod wm_queue;
mod worker;

pub use decoder::Bz2Decoder;
pub use error::{Error, Result};
pub use pipeline::Config;
pub use scanner::{extract_bits, MagicKind, Scanner};

use std::io::{Read, Write};
use std::path::Path;

/// Runs the full pipeline against an arbitrary reader/writer pair with an
/// explicit [`Config`], reporting cumulative input bytes consumed through
/// `progress` as the muxer writes output. The building block `pbunzip2` and
/// [`decompress_reader`]/[`decompress_file`] are both written in terms of.
pub fn decompress<R: Read + Send, W: Write>(
    reader: R,
    writer: W,
    config: Config,
    progress: Option<&mut dyn FnMut(u64)>,
) -> Result<()> {
    pipeline::run(reader, writer, config, progress)
}

/// Decompresses an entire reader's worth of bzip2 data and returns the
/// plaintext. Runs the full Splitter/Worker-pool/Muxer pipeline with
/// `num_workers` decoding threads; primarily useful for tests and small
/// inputs. For large files or streaming consumers, prefer [`Bz2Decoder`].
pub fn decompress_reader<R: Read + Send>(reader: R, num_workers: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let config = Config::new(num_workers);
    pipeline::run(reader, &mut out, config, None)?;
    Ok(out)
}

/// Decompresses a bzip2 file at `path` and returns the plaintext.
pub fn decompress_file<P: AsRef<Path>>(path: P, num_workers: u32) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    decompress_reader(file, num_workers)
}

/// Decodes a single block's raw bits, `[start_bit, end_bit)` into `data`
/// (the same half-open, left-justified range [`extract_bits`] expects, with
/// `start_bit` landing on the block's own magic), and returns its plaintext.
/// A thin convenience wrapper around the scanner/codec boundary the pipeline
/// itself uses internally — useful for tests and fuzzing that boundary in
/// isolation, without running the full pipeline.
pub fn decompress_block(data: &[u8], start_bit: u64, end_bit: u64) -> Result<Vec<u8>> {
    let payload = scanner::extract_bits(data, start_bit, end_bit);
    Ok(codec::decode_block(&payload)?.data)
}
