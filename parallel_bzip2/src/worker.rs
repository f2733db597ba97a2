//! Worker thread body.
//!
//! Locating block boundaries is an inherently sequential scan (finding
//! block N+1 requires having already found the end of block N), so at most
//! one worker is ever actually scanning at a time: `SwQueue::get_first`
//! hands out exactly one `Scan` job per file, and that worker keeps going
//! — straddling across chunk boundaries via `get_second` — all the way to
//! the last byte of the input. Every other worker (and this one, once its
//! scan lineage ends) spends its time on `Decode` jobs pulled from the same
//! queue, which is where the pipeline's actual parallelism comes from.

use std::sync::Arc;

use crate::block::{BlockId, CompressedBlock, DecompressedSubBlock, SubBlockKey};
use crate::chunk::{InputChunk, CHUNK_BYTES};
use crate::codec;
use crate::error::{Error, Result};
use crate::scanner::{
    extract_bits, parse_after_match, MagicKind, PostBlock, ScanState, Scanner, MAGIC_BITS,
};
use crate::sw_queue::{FirstItem, SecondItem, SwQueue};
use crate::wm_queue::WmQueue;

/// Runs one worker until the splitter and every other worker have finished,
/// i.e. until `SwQueue::get_first` reports `Done`. Whether this returns `Ok`
/// or `Err`, `WmQueue::worker_exited` is called exactly once, so a failed
/// worker can never leave the muxer waiting on a count that never reaches
/// zero.
pub fn run(sw: &SwQueue, wm: &WmQueue, scanner: &Scanner) -> Result<()> {
    let result = run_until_done(sw, wm, scanner);
    if result.is_err() {
        wm.worker_exited();
    }
    result
}

fn run_until_done(sw: &SwQueue, wm: &WmQueue, scanner: &Scanner) -> Result<()> {
    loop {
        match sw.get_first() {
            FirstItem::Done => {
                wm.worker_exited();
                return Ok(());
            }
            FirstItem::Decode(block) => decode_and_emit(block, wm)?,
            FirstItem::Scan(chunk) => {
                let result = scan_lineage(chunk, sw, wm, scanner);
                sw.done_scanning();
                result?;
            }
        }
    }
}

/// Assigns increasing `bzip2_idx` values within each `chunk_id`, resetting
/// whenever the chunk id advances. Chunk ids only ever increase during a
/// scan, so a single running counter suffices.
struct IdxTracker {
    chunk_id: u64,
    next_idx: u64,
}

impl IdxTracker {
    fn new() -> Self {
        IdxTracker {
            chunk_id: 0,
            next_idx: 0,
        }
    }

    fn take(&mut self, chunk_id: u64) -> u64 {
        if self.chunk_id != chunk_id {
            self.chunk_id = chunk_id;
            self.next_idx = 0;
        }
        let idx = self.next_idx;
        self.next_idx += 1;
        idx
    }
}

fn chunk_id_of(abs_bit: u64) -> u64 {
    (abs_bit / 8) / CHUNK_BYTES as u64 + 1
}

fn release_and_refund(sw: &SwQueue, wm: &WmQueue, chunk_id: u64) {
    let freed = sw.release_chunk(chunk_id);
    wm.release_credit(freed);
}

/// Pull the next chunk in via `get_second`, decoding any ready blocks the
/// queue hands back in the meantime. Returns `Ok(true)` once more bytes
/// were appended to `hay`, `Ok(false)` at true end of input.
fn fetch_more(
    chunk: &mut Arc<InputChunk>,
    hay: &mut Vec<u8>,
    sw: &SwQueue,
    wm: &WmQueue,
) -> Result<bool> {
    loop {
        match sw.get_second(chunk.id) {
            SecondItem::Decode(blk) => decode_and_emit(blk, wm)?,
            SecondItem::Next(next_chunk) => {
                release_and_refund(sw, wm, chunk.id);
                hay.extend_from_slice(&next_chunk.as_bytes());
                *chunk = next_chunk;
                return Ok(true);
            }
            SecondItem::Eof => {
                release_and_refund(sw, wm, chunk.id);
                return Ok(false);
            }
        }
    }
}

/// Scans forward from `first_chunk` to the true end of input, locating
/// every block and stream trailer and publishing each one for decoding.
/// `first_chunk` is always the file's first chunk in practice (only one
/// scan lineage ever runs), but the header check below only fires for
/// `chunk_id == 1` so the function degrades sanely if that ever changes.
fn scan_lineage(
    first_chunk: Arc<InputChunk>,
    sw: &SwQueue,
    wm: &WmQueue,
    scanner: &Scanner,
) -> Result<()> {
    let mut chunk = first_chunk;
    let mut hay: Vec<u8> = chunk.as_bytes();
    let mut global_bit_base: u64 = (chunk.id - 1) * CHUNK_BYTES as u64 * 8;
    let mut block_start_bit: u64;
    let mut pending_new_stream_bs100k: Option<u8> = None;
    let mut idx = IdxTracker::new();

    if chunk.id == 1 {
        if hay.len() < 4 || &hay[0..3] != b"BZh" || !(b'1'..=b'9').contains(&hay[3]) {
            return Err(Error::NotBzip2);
        }
        pending_new_stream_bs100k = Some(hay[3] - b'0');
        block_start_bit = 32;
    } else {
        block_start_bit = 0;
    }

    loop {
        let search_from = block_start_bit + MAGIC_BITS as u64;
        let found = scanner.scan_from(&hay, search_from, &mut ScanState::default());
        let (kind, match_bit) = match found {
            Some(hit) => hit,
            None => {
                if fetch_more(&mut chunk, &mut hay, sw, wm)? {
                    continue;
                }
                return finalize_at_eof(&hay, block_start_bit);
            }
        };

        let start_abs = global_bit_base + block_start_bit;
        let end_abs = global_bit_base + match_bit;
        let start_chunk_id = chunk_id_of(start_abs);
        let end_chunk_id = chunk_id_of(end_abs);

        let payload = extract_bits(&hay, block_start_bit, match_bit);
        let mut blk = CompressedBlock {
            id: BlockId {
                chunk_id: start_chunk_id,
                bzip2_idx: idx.take(start_chunk_id),
            },
            last_in_chunk: start_chunk_id != end_chunk_id,
            payload,
            new_stream_bs100k: pending_new_stream_bs100k.take(),
            stream_end_crc: None,
            end_byte_offset: end_abs / 8,
            sentinel: false,
        };

        // Chunks this block's payload straddled entirely contribute no
        // block start of their own; a sentinel keeps their (chunk_id, 0)
        // slot filled so the muxer never stalls waiting on a gap.
        for mid_chunk_id in (start_chunk_id + 1)..end_chunk_id {
            sw.push_decode(CompressedBlock {
                id: BlockId {
                    chunk_id: mid_chunk_id,
                    bzip2_idx: idx.take(mid_chunk_id),
                },
                last_in_chunk: true,
                payload: Vec::new(),
                new_stream_bs100k: None,
                stream_end_crc: None,
                end_byte_offset: end_abs / 8,
                sentinel: true,
            });
        }

        match kind {
            MagicKind::Block => {
                sw.push_decode(blk);
                block_start_bit = match_bit;
            }
            MagicKind::Eos => loop {
                match parse_after_match(&hay, MagicKind::Eos, match_bit) {
                    PostBlock::NeedMoreData => {
                        if !fetch_more(&mut chunk, &mut hay, sw, wm)? {
                            return Err(Error::UnterminatedBlock);
                        }
                    }
                    PostBlock::StreamEnd {
                        stream_crc,
                        next_stream_bs100k,
                        next_stream_bit_offset,
                    } => {
                        blk.stream_end_crc = Some(stream_crc);
                        sw.push_decode(blk);
                        match next_stream_bit_offset {
                            Some(next_bit) => {
                                pending_new_stream_bs100k = next_stream_bs100k;
                                block_start_bit = next_bit;
                            }
                            None => {
                                release_and_refund(sw, wm, chunk.id);
                                return Ok(());
                            }
                        }
                        break;
                    }
                    PostBlock::NextBlock { .. } => {
                        unreachable!("an Eos match never parses as another block")
                    }
                }
            },
        }

        // Bound memory: nothing before the new block_start_bit is needed
        // again, so trim hay's prefix and rebase offsets accordingly.
        let drop_bytes = (block_start_bit / 8) as usize;
        if drop_bytes > 0 && drop_bytes <= hay.len() {
            hay.drain(0..drop_bytes);
            global_bit_base += drop_bytes as u64 * 8;
            block_start_bit -= drop_bytes as u64 * 8;
        }
    }
}

/// True end of input reached with no further magic found. Trailing
/// all-zero padding (bzip2 sometimes flushes a partial byte of zero bits
/// at the very end) is benign; anything else means the last block was
/// truncated.
fn finalize_at_eof(hay: &[u8], block_start_bit: u64) -> Result<()> {
    let start_byte = ((block_start_bit + 7) / 8) as usize;
    let tail = &hay[start_byte.min(hay.len())..];
    if tail.iter().all(|&b| b == 0) {
        Ok(())
    } else {
        Err(Error::UnterminatedBlock)
    }
}

fn decode_and_emit(block: CompressedBlock, wm: &WmQueue) -> Result<()> {
    if block.sentinel {
        wm.publish(DecompressedSubBlock {
            key: SubBlockKey::first_of(block.id),
            data: Vec::new(),
            last_in_block: true,
            last_in_chunk: block.last_in_chunk,
            block_crc: None,
            bs100k1: None,
            new_stream_bs100k: block.new_stream_bs100k,
            stream_end_crc: block.stream_end_crc,
            end_byte_offset: block.end_byte_offset,
        });
        return Ok(());
    }

    let decoded = codec::decode_block(&block.payload)?;
    let parts = codec::split_sub_blocks(decoded.data);
    let last_idx = parts.len() as u64 - 1;
    for (i, data) in parts.into_iter().enumerate() {
        let sub_idx = i as u64;
        let is_last = sub_idx == last_idx;
        wm.publish(DecompressedSubBlock {
            key: SubBlockKey {
                chunk_id: block.id.chunk_id,
                bzip2_idx: block.id.bzip2_idx,
                sub_idx,
            },
            data,
            last_in_block: is_last,
            last_in_chunk: is_last && block.last_in_chunk,
            block_crc: if is_last { Some(decoded.crc) } else { None },
            bs100k1: if is_last { Some(decoded.bs100k1) } else { None },
            new_stream_bs100k: if is_last { block.new_stream_bs100k } else { None },
            stream_end_crc: if is_last { block.stream_end_crc } else { None },
            end_byte_offset: block.end_byte_offset,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNK_WORDS;
    use crate::ms_queue::MsQueue;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn make_chunk(id: u64, bytes: &[u8], eof: bool) -> Arc<InputChunk> {
        let loaded = (bytes.len() + 3) / 4;
        let mut words = vec![0u32; CHUNK_WORDS];
        for (i, w) in words.iter_mut().enumerate().take(loaded) {
            let base = i * 4;
            let b0 = bytes.get(base).copied().unwrap_or(0);
            let b1 = bytes.get(base + 1).copied().unwrap_or(0);
            let b2 = bytes.get(base + 2).copied().unwrap_or(0);
            let b3 = bytes.get(base + 3).copied().unwrap_or(0);
            *w = u32::from_be_bytes([b0, b1, b2, b3]);
        }
        Arc::new(InputChunk {
            id,
            words: words.into_boxed_slice(),
            loaded,
            eof,
        })
    }

    #[test]
    fn scans_and_decodes_a_stream_straddling_two_chunks() {
        let plaintext = b"a deterministic little bit of text to compress, repeated.\n".repeat(20);
        let compressed = compress(&plaintext);
        let mid = compressed.len() / 2;
        let (first_half, second_half) = compressed.split_at(mid);

        let sw = SwQueue::new();
        let wm = WmQueue::new(
            1,
            SubBlockKey {
                chunk_id: 1,
                bzip2_idx: 0,
                sub_idx: 0,
            },
        );
        let _ms = MsQueue::new(4);
        let scanner = Scanner::new();

        sw.publish_chunk(make_chunk(1, first_half, false), None);
        sw.publish_chunk(make_chunk(2, second_half, true), Some(1));

        let chunk = match sw.get_first() {
            FirstItem::Scan(c) => c,
            _ => panic!("expected scan work"),
        };
        scan_lineage(chunk, &sw, &wm, &scanner).unwrap();
        sw.done_scanning();

        loop {
            match sw.get_first() {
                FirstItem::Decode(blk) => decode_and_emit(blk, &wm).unwrap(),
                FirstItem::Done => break,
                FirstItem::Scan(_) => panic!("only one scan lineage is ever handed out"),
            }
        }
        wm.worker_exited();

        let drained = wm.wait_and_drain();
        assert_eq!(drained.working, 0);
        let mut subs = drained.subs;
        subs.sort_by_key(|s| s.key);
        let joined: Vec<u8> = subs.into_iter().flat_map(|s| s.data).collect();
        assert_eq!(joined, plaintext);
    }

    #[test]
    fn rejects_input_without_a_bzip2_header() {
        let sw = SwQueue::new();
        let wm = WmQueue::new(
            1,
            SubBlockKey {
                chunk_id: 1,
                bzip2_idx: 0,
                sub_idx: 0,
            },
        );
        let scanner = Scanner::new();
        sw.publish_chunk(make_chunk(1, b"not a bzip2 file at all", true), None);
        let chunk = match sw.get_first() {
            FirstItem::Scan(c) => c,
            _ => panic!("expected scan work"),
        };
        let err = scan_lineage(chunk, &sw, &wm, &scanner).unwrap_err();
        assert!(matches!(err, Error::NotBzip2));
    }
}
