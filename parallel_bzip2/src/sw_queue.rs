//! SW queue: splitter publishes input chunks here; workers pull from it
//! either to scan a fresh chunk or to decode an already-located block.
//!
//! Two predicates are multiplexed on one condition variable. `get_first`
//! (a worker with nothing in hand) only proceeds once scanning has fully
//! stopped at EOF; `get_second` (a worker mid-scan, needing the next chunk
//! to finish a straddling block) is satisfied by EOF alone, since it
//! already knows no more scanning of *this* chunk is coming. Decoding
//! always takes priority over scanning: both entry points drain `deco_q`
//! before touching the unscanned chain.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};

use crate::block::{BlockId, CompressedBlock};
use crate::chunk::{ChunkArena, InputChunk};

struct HeapBlock(CompressedBlock);

impl PartialEq for HeapBlock {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for HeapBlock {}
impl PartialOrd for HeapBlock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapBlock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

struct SwState {
    arena: ChunkArena,
    next_scan: Option<u64>,
    eof: bool,
    deco_q: BinaryHeap<Reverse<HeapBlock>>,
    scanning: u32,
}

pub enum FirstItem {
    Decode(CompressedBlock),
    Scan(Arc<InputChunk>),
    Done,
}

pub enum SecondItem {
    Decode(CompressedBlock),
    Next(Arc<InputChunk>),
    Eof,
}

pub struct SwQueue {
    state: Mutex<SwState>,
    cv: Condvar,
}

impl SwQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SwState {
                arena: ChunkArena::new(),
                next_scan: None,
                eof: false,
                deco_q: BinaryHeap::new(),
                scanning: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Publish a newly-read chunk. `prev_tail` is the id of the previous
    /// tail chunk, if any.
    pub fn publish_chunk(&self, chunk: Arc<InputChunk>, prev_tail: Option<u64>) {
        let id = chunk.id;
        let is_eof = chunk.eof;
        let mut st = self.state.lock().unwrap();
        let next_scan_was_empty = st.next_scan.is_none();
        st.arena.publish(chunk, prev_tail.is_some());
        match prev_tail {
            Some(prev) => st.arena.link(prev, id),
            None => {}
        }
        if st.next_scan.is_none() {
            st.next_scan = Some(id);
        }
        if is_eof {
            st.eof = true;
        }
        // Enabling transitions: next_scan null->non-null, or eof false->true.
        if next_scan_was_empty || is_eof {
            self.cv.notify_all();
        }
    }

    /// Worker has no chunk in hand (either just started, or just finished
    /// decoding). Blocks until decode work, scan work, or shutdown.
    pub fn get_first(&self) -> FirstItem {
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(Reverse(HeapBlock(blk))) = st.deco_q.pop() {
                return FirstItem::Decode(blk);
            }
            if let Some(id) = st.next_scan {
                let chunk = st.arena.get(id).expect("next_scan points at live chunk");
                st.next_scan = st.arena.next_of(id);
                st.scanning += 1;
                return FirstItem::Scan(chunk);
            }
            if st.eof && st.scanning == 0 {
                self.cv.notify_all();
                return FirstItem::Done;
            }
            st = self.cv.wait(st).unwrap();
        }
    }

    /// No further chunk is coming and none is being published now (the
    /// empty-file case, or a read that landed exactly on a chunk boundary
    /// and then returned zero bytes on the following attempt).
    pub fn mark_eof_no_chunk(&self) {
        let mut st = self.state.lock().unwrap();
        if !st.eof {
            st.eof = true;
            self.cv.notify_all();
        }
    }

    /// Worker is mid-scan and has exhausted `current_chunk_id`'s bits;
    /// wait for its successor to exist (or drain decode work meanwhile).
    /// Caller is responsible for releasing `current_chunk_id` itself
    /// (once, via [`SwQueue::release_chunk`]) before or after calling
    /// this — safe to call repeatedly with the same id.
    pub fn get_second(&self, current_chunk_id: u64) -> SecondItem {
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(Reverse(HeapBlock(blk))) = st.deco_q.pop() {
                return SecondItem::Decode(blk);
            }
            if let Some(succ) = st.arena.next_of(current_chunk_id) {
                if let Some(chunk) = st.arena.get(succ) {
                    if st.next_scan == Some(succ) {
                        st.next_scan = st.arena.next_of(succ);
                    }
                    return SecondItem::Next(chunk);
                }
            }
            if st.eof {
                return SecondItem::Eof;
            }
            st = self.cv.wait(st).unwrap();
        }
    }

    /// Called by a worker once it has fully consumed a chunk with no
    /// straddle in progress (e.g. a short terminal chunk, or after the
    /// chunk's tail was handed off via `get_second`). Returns how many
    /// chunks were actually freed (the caller owes that many MS-queue
    /// slot credits back).
    pub fn release_chunk(&self, id: u64) -> u32 {
        let mut st = self.state.lock().unwrap();
        st.arena.release(id)
    }

    /// Worker finished scanning (found its last block, or hit EOF) and is
    /// returning to `get_first`.
    pub fn done_scanning(&self) {
        let mut st = self.state.lock().unwrap();
        st.scanning -= 1;
        let should_wake = st.eof && st.scanning == 0;
        if should_wake {
            self.cv.notify_all();
        }
    }

    /// Publish a located block for decoding (`work_oflush`).
    pub fn push_decode(&self, block: CompressedBlock) {
        let mut st = self.state.lock().unwrap();
        let was_empty = st.deco_q.is_empty();
        st.deco_q.push(Reverse(HeapBlock(block)));
        if was_empty {
            self.cv.notify_all();
        }
    }

    #[cfg(test)]
    pub fn deco_q_len(&self) -> usize {
        self.state.lock().unwrap().deco_q.len()
    }
}

impl Default for SwQueue {
    fn default() -> Self {
        Self::new()
    }
}
