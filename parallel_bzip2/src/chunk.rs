//! Input chunk representation and the arena that owns chunk lifetime.
//!
//! Chunks are published by the splitter and consumed by workers. Two
//! references exist on every chunk for most of its life: one held by the
//! unscanned-chain (`next_scan`, or a predecessor's `next` field before a
//! worker has picked the chunk up), and one held by the predecessor chunk's
//! `next` link, which is only released when the predecessor itself is
//! freed. `ChunkArena::release` drops the caller's reference and, if that
//! was the last one, cascades the release down `next` so the whole chain
//! unwinds tail-first without anyone needing a second lock.

use std::collections::HashMap;
use std::sync::Arc;

/// Number of 32-bit words read per chunk (4 MiB).
pub const CHUNK_WORDS: usize = 1_048_576;
pub const CHUNK_BYTES: usize = CHUNK_WORDS * 4;

/// A fixed-size slab of compressed input, read once by the splitter and
/// shared read-only by every worker that touches it.
pub struct InputChunk {
    pub id: u64,
    pub words: Box<[u32]>,
    /// Number of valid words in `words` (== CHUNK_WORDS unless this is the
    /// final, short chunk).
    pub loaded: usize,
    /// True if this is the last chunk the splitter will ever produce.
    pub eof: bool,
}

impl InputChunk {
    pub fn is_short(&self) -> bool {
        self.loaded < CHUNK_WORDS
    }

    /// Big-endian byte view of the loaded portion of this chunk, matching
    /// the bit order bzip2's wire format uses.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.loaded * 4);
        for &w in &self.words[..self.loaded] {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }
}

struct ChunkSlot {
    chunk: Arc<InputChunk>,
    next: Option<u64>,
    refcount: u32,
}

/// Arena of live input chunks keyed by id, intended to live inside the SW
/// queue's mutex so refcount/next mutation is implicitly single-threaded.
#[derive(Default)]
pub struct ChunkArena {
    slots: HashMap<u64, ChunkSlot>,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a freshly-read chunk. `has_predecessor` is true unless this
    /// is the very first chunk of the file.
    pub fn publish(&mut self, chunk: Arc<InputChunk>, has_predecessor: bool) {
        let id = chunk.id;
        let refcount = 1 + has_predecessor as u32;
        self.slots.insert(
            id,
            ChunkSlot {
                chunk,
                next: None,
                refcount,
            },
        );
    }

    /// Link `prev_id`'s successor to `succ_id`. Must be called once, right
    /// after `succ_id` has been published with `has_predecessor = true`.
    pub fn link(&mut self, prev_id: u64, succ_id: u64) {
        if let Some(slot) = self.slots.get_mut(&prev_id) {
            slot.next = Some(succ_id);
        }
    }

    pub fn get(&self, id: u64) -> Option<Arc<InputChunk>> {
        self.slots.get(&id).map(|s| s.chunk.clone())
    }

    pub fn next_of(&self, id: u64) -> Option<u64> {
        self.slots.get(&id).and_then(|s| s.next)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots.contains_key(&id)
    }

    /// Drop one reference on `id`. If that was the last reference, the slot
    /// is freed and, if it had a successor link, the release cascades.
    /// Returns how many chunks were actually freed by this call (0, 1, or
    /// more if the release cascaded through several fully-spent slots) —
    /// each one is a slot credit owed back to the splitter.
    pub fn release(&mut self, id: u64) -> u32 {
        let mut freed = 0;
        let mut cur = Some(id);
        while let Some(this_id) = cur {
            let Some(slot) = self.slots.get_mut(&this_id) else {
                break;
            };
            slot.refcount -= 1;
            if slot.refcount > 0 {
                break;
            }
            let slot = self.slots.remove(&this_id).expect("just looked up");
            freed += 1;
            cur = slot.next;
        }
        freed
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
