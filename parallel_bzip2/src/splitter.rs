//! The splitter: a single thread that reads fixed-size chunks from the
//! input and publishes them into the SW queue, throttled by MS-queue slot
//! credits so only a bounded number of chunks are ever in flight.

use std::io::Read;
use std::sync::Arc;

use crate::chunk::{InputChunk, CHUNK_BYTES, CHUNK_WORDS};
use crate::error::Result;
use crate::ms_queue::MsQueue;
use crate::sw_queue::SwQueue;

/// Reads the whole input and publishes it as chunks. Whether this returns
/// `Ok` or `Err`, the SW queue's `eof` flag ends up set, so a read failure
/// partway through can never leave a worker blocked forever waiting for a
/// chunk that will never arrive.
pub fn run<R: Read>(reader: R, sw: &SwQueue, ms: &MsQueue) -> Result<()> {
    let result = run_until_eof(reader, sw, ms);
    if result.is_err() {
        sw.mark_eof_no_chunk();
    }
    result
}

fn run_until_eof<R: Read>(mut reader: R, sw: &SwQueue, ms: &MsQueue) -> Result<()> {
    let mut next_id: u64 = 1;
    let mut prev_tail: Option<u64> = None;

    loop {
        ms.acquire();

        let mut buf = vec![0u8; CHUNK_BYTES];
        let mut total_read = 0usize;
        while total_read < CHUNK_BYTES {
            let n = reader.read(&mut buf[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
        }

        if total_read == 0 {
            ms.release(1);
            sw.mark_eof_no_chunk();
            return Ok(());
        }

        let loaded_words = (total_read + 3) / 4;
        let mut words = vec![0u32; CHUNK_WORDS];
        for i in 0..loaded_words {
            let base = i * 4;
            let b0 = buf.get(base).copied().unwrap_or(0);
            let b1 = buf.get(base + 1).copied().unwrap_or(0);
            let b2 = buf.get(base + 2).copied().unwrap_or(0);
            let b3 = buf.get(base + 3).copied().unwrap_or(0);
            words[i] = u32::from_be_bytes([b0, b1, b2, b3]);
        }

        let is_eof = total_read < CHUNK_BYTES;
        let chunk = Arc::new(InputChunk {
            id: next_id,
            words: words.into_boxed_slice(),
            loaded: loaded_words,
            eof: is_eof,
        });

        sw.publish_chunk(chunk, prev_tail);
        prev_tail = Some(next_id);
        next_id += 1;

        if is_eof {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sw_queue::FirstItem;

    #[test]
    fn empty_input_marks_eof_with_no_chunk() {
        let sw = SwQueue::new();
        let ms = MsQueue::new(4);
        run(&b""[..], &sw, &ms).unwrap();
        match sw.get_first() {
            FirstItem::Done => {}
            _ => panic!("expected immediate Done on empty input"),
        }
        assert_eq!(ms.available(), 4);
    }

    #[test]
    fn short_input_publishes_one_short_eof_chunk() {
        let sw = SwQueue::new();
        let ms = MsQueue::new(4);
        let data = b"hello world";
        run(&data[..], &sw, &ms).unwrap();
        match sw.get_first() {
            FirstItem::Scan(chunk) => {
                assert_eq!(chunk.id, 1);
                assert!(chunk.eof);
                assert!(chunk.is_short());
                assert_eq!(chunk.loaded, (data.len() + 3) / 4);
            }
            _ => panic!("expected a chunk to scan"),
        }
    }
}
