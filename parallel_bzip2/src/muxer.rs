//! The muxer: single consumer of the WM queue, responsible for writing
//! plaintext out in the original order, folding and checking stream CRCs,
//! and refunding chunk-slot credits to the MS queue as they arrive.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;

use crate::block::{DecompressedSubBlock, SubBlockKey};
use crate::codec;
use crate::error::{Error, Result};
use crate::ms_queue::MsQueue;
use crate::wm_queue::WmQueue;

struct HeapSub(DecompressedSubBlock);

impl PartialEq for HeapSub {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}
impl Eq for HeapSub {}
impl PartialOrd for HeapSub {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapSub {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.key.cmp(&other.0.key)
    }
}

fn next_key(cur: SubBlockKey, last_in_block: bool, last_in_chunk: bool) -> SubBlockKey {
    if !last_in_block {
        SubBlockKey {
            sub_idx: cur.sub_idx + 1,
            ..cur
        }
    } else if !last_in_chunk {
        SubBlockKey {
            bzip2_idx: cur.bzip2_idx + 1,
            sub_idx: 0,
            ..cur
        }
    } else {
        SubBlockKey {
            chunk_id: cur.chunk_id + 1,
            bzip2_idx: 0,
            sub_idx: 0,
        }
    }
}

/// Drains the WM queue in order, writing plaintext to `out` and refunding
/// MS-queue credits as chunks are freed. `progress`, if given, is called
/// with the cumulative input byte offset after every sub-block written.
pub fn run<W: Write>(
    wm: &WmQueue,
    ms: &MsQueue,
    mut out: W,
    mut progress: Option<&mut dyn FnMut(u64)>,
) -> Result<()> {
    let mut reord: BinaryHeap<Reverse<HeapSub>> = BinaryHeap::new();
    let mut needed = SubBlockKey {
        chunk_id: 1,
        bzip2_idx: 0,
        sub_idx: 0,
    };
    let mut stream_crc: u32 = 0;
    let mut any_stream_seen = false;
    let mut current_bs100k: u8 = 0;

    loop {
        let drained = wm.wait_and_drain();
        for sub in drained.subs {
            reord.push(Reverse(HeapSub(sub)));
        }
        ms.release(drained.credits);

        while let Some(Reverse(HeapSub(top))) = reord.peek() {
            if top.key != needed {
                break;
            }
            let Reverse(HeapSub(sub)) = reord.pop().unwrap();

            if let Some(bs100k) = sub.new_stream_bs100k {
                any_stream_seen = true;
                stream_crc = 0;
                current_bs100k = bs100k;
            }

            out.write_all(&sub.data)?;
            if let Some(cb) = progress.as_deref_mut() {
                cb(sub.end_byte_offset);
            }

            if let Some(bs100k1) = sub.bs100k1 {
                if current_bs100k < bs100k1 {
                    return Err(Error::BlockOverrun {
                        block: bs100k1,
                        stream: current_bs100k,
                    });
                }
            }
            if let Some(block_crc) = sub.block_crc {
                stream_crc = codec::fold_stream_crc(stream_crc, block_crc);
            }
            if let Some(expected) = sub.stream_end_crc {
                if expected != stream_crc {
                    return Err(Error::StreamCrcMismatch {
                        expected,
                        found: stream_crc,
                    });
                }
                stream_crc = 0;
            }

            needed = next_key(sub.key, sub.last_in_block, sub.last_in_chunk);
            wm.set_needed(needed);
        }

        if drained.working == 0 && reord.is_empty() {
            break;
        }
    }

    out.flush()?;
    if !any_stream_seen {
        return Err(Error::NotBzip2);
    }
    Ok(())
}
