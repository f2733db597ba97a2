//! Locates bzip2 block and end-of-stream magics at arbitrary bit offsets.
//!
//! A two-pass DFA does the finding: a byte-indexed table (`ByteTable`)
//! advances 8 bits at a time and flags when an accept state was reached
//! somewhere inside the byte just consumed; a bit-indexed automaton
//! (`BitDfa`) then re-walks just that one byte, from the state the coarse
//! pass entered it with, to recover the exact bit the match starts at.
//! Both tables are derived once, in [`Scanner::new`], from the 48-bit
//! magic constants themselves via the standard KMP failure-function
//! construction — nothing is a literal precomputed blob.
//!
//! `PostBlockParser` picks up immediately after a match: it reads the
//! bits that follow a block magic (nothing further — the next block's own
//! header carries its CRC) or an end-of-stream magic (the stream's stored
//! CRC, then an optional new stream header once byte-aligned).

pub const MAGIC_BLOCK: u64 = 0x3141_5926_5359;
pub const MAGIC_EOS: u64 = 0x1772_4538_5090;
pub const MAGIC_BITS: u32 = 48;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MagicKind {
    Block,
    Eos,
}

/// A bit-indexed KMP automaton matching one fixed-length bit pattern.
struct BitDfa {
    /// transitions[state][bit] -> next state. `accept` is absorbing.
    transitions: Vec<[u16; 2]>,
    accept: u16,
}

impl BitDfa {
    fn build(pattern: u64, bits: u32) -> Self {
        let n = bits as usize;
        let bit_of = |i: usize| -> u8 { ((pattern >> (bits as usize - 1 - i)) & 1) as u8 };

        // KMP failure function over the bit sequence.
        let mut fail = vec![0usize; n + 1];
        let mut k = 0usize;
        for i in 1..n {
            while k > 0 && bit_of(i) != bit_of(k) {
                k = fail[k];
            }
            if bit_of(i) == bit_of(k) {
                k += 1;
            }
            fail[i + 1] = k;
        }

        let mut transitions = vec![[0u16; 2]; n + 1];
        for state in 0..n {
            for &bit in &[0u8, 1u8] {
                let mut s = state;
                loop {
                    if bit_of(s) == bit {
                        s += 1;
                        break;
                    }
                    if s == 0 {
                        break;
                    }
                    s = fail[s];
                }
                transitions[state][bit as usize] = s as u16;
            }
        }
        transitions[n] = [n as u16, n as u16];

        BitDfa {
            transitions,
            accept: n as u16,
        }
    }

    fn step(&self, state: u16, bit: u8) -> u16 {
        self.transitions[state as usize][bit as usize]
    }

    /// Bit-step through one byte (MSB first) from `entry`, returning the
    /// 0-based bit index (0 = MSB) at which `accept` is first reached.
    /// Only call this when the coarse pass already reported a hit.
    fn fine_scan(&self, entry: u16, byte: u8) -> u8 {
        let mut s = entry;
        for bitpos in (0..8).rev() {
            let bit = (byte >> bitpos) & 1;
            s = self.step(s, bit);
            if s == self.accept {
                return 7 - bitpos;
            }
        }
        unreachable!("fine_scan called without a guaranteed hit in this byte")
    }
}

/// Byte-indexed coarse pass derived from a [`BitDfa`]: for every
/// (state, byte) pair, the state reached after consuming all 8 bits, and
/// whether `accept` was passed through somewhere inside.
struct ByteTable {
    next: Vec<[u16; 256]>,
    hit: Vec<[bool; 256]>,
}

impl ByteTable {
    fn build(dfa: &BitDfa) -> Self {
        let num_states = dfa.accept as usize; // non-accepting states only
        let mut next = vec![[0u16; 256]; num_states];
        let mut hit = vec![[false; 256]; num_states];
        for state in 0..num_states {
            for byte in 0..256usize {
                let mut s = state as u16;
                let mut any_hit = false;
                for bitpos in (0..8).rev() {
                    let bit = ((byte >> bitpos) & 1) as u8;
                    s = dfa.step(s, bit);
                    if s == dfa.accept {
                        any_hit = true;
                        // A byte only needs to report the first accept
                        // within it; the caller stops scanning there.
                        break;
                    }
                }
                next[state][byte] = s;
                hit[state][byte] = any_hit;
            }
        }
        ByteTable { next, hit }
    }

    fn step(&self, state: u16, byte: u8) -> (u16, bool) {
        (
            self.next[state as usize][byte as usize],
            self.hit[state as usize][byte as usize],
        )
    }
}

/// Automaton state carried across calls to [`Scanner::scan`] when a single
/// logical scan straddles more than one input chunk.
#[derive(Clone, Copy, Default)]
pub struct ScanState {
    block_state: u16,
    eos_state: u16,
}

pub struct Scanner {
    block_dfa: BitDfa,
    eos_dfa: BitDfa,
    block_bytes: ByteTable,
    eos_bytes: ByteTable,
}

impl Scanner {
    pub fn new() -> Self {
        let block_dfa = BitDfa::build(MAGIC_BLOCK, MAGIC_BITS);
        let eos_dfa = BitDfa::build(MAGIC_EOS, MAGIC_BITS);
        let block_bytes = ByteTable::build(&block_dfa);
        let eos_bytes = ByteTable::build(&eos_dfa);
        Scanner {
            block_dfa,
            eos_dfa,
            block_bytes,
            eos_bytes,
        }
    }

    /// Scan `data` byte by byte, continuing from `state`, for the first
    /// occurrence of either magic. Returns the bit offset of the match,
    /// relative to the start of `data`. On no match, `state` is updated so
    /// a following call with more data (immediately following `data`)
    /// resumes correctly.
    pub fn scan(&self, data: &[u8], state: &mut ScanState) -> Option<(MagicKind, u64)> {
        self.scan_from(data, 0, state)
    }

    /// Like [`Scanner::scan`], but ignores any match that would start
    /// before `min_bit_offset` (relative to `data`). Used when resuming a
    /// scan right after a previous match, where the true cursor sits at an
    /// arbitrary bit but `data` is only addressable byte-wise.
    pub fn scan_from(
        &self,
        data: &[u8],
        min_bit_offset: u64,
        state: &mut ScanState,
    ) -> Option<(MagicKind, u64)> {
        for (byte_idx, &byte) in data.iter().enumerate() {
            let block_entry = state.block_state;
            let eos_entry = state.eos_state;
            let (bn, bhit) = self.block_bytes.step(block_entry, byte);
            let (en, ehit) = self.eos_bytes.step(eos_entry, byte);
            if bhit {
                let bit_in_byte = self.block_dfa.fine_scan(block_entry, byte);
                let end_bit = byte_idx as u64 * 8 + bit_in_byte as u64;
                let start_bit = end_bit + 1 - MAGIC_BITS as u64;
                if start_bit >= min_bit_offset {
                    return Some((MagicKind::Block, start_bit));
                }
            }
            if ehit {
                let bit_in_byte = self.eos_dfa.fine_scan(eos_entry, byte);
                let end_bit = byte_idx as u64 * 8 + bit_in_byte as u64;
                let start_bit = end_bit + 1 - MAGIC_BITS as u64;
                if start_bit >= min_bit_offset {
                    return Some((MagicKind::Eos, start_bit));
                }
            }
            state.block_state = bn;
            state.eos_state = en;
        }
        None
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// A cursor over a byte slice addressed in bits, MSB first per byte — the
/// same bit order the bzip2 wire format itself uses.
pub struct BitCursor<'a> {
    data: &'a [u8],
    pos: u64,
}

impl<'a> BitCursor<'a> {
    pub fn new(data: &'a [u8], start_bit: u64) -> Self {
        BitCursor { data, pos: start_bit }
    }

    pub fn bit_pos(&self) -> u64 {
        self.pos
    }

    fn total_bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }

    pub fn remaining(&self) -> u64 {
        self.total_bits().saturating_sub(self.pos)
    }

    pub fn read_bits(&mut self, n: u32) -> Option<u64> {
        if self.remaining() < n as u64 {
            return None;
        }
        let mut val = 0u64;
        for _ in 0..n {
            let byte_idx = (self.pos / 8) as usize;
            let bit_idx = 7 - (self.pos % 8) as u32;
            let bit = (self.data[byte_idx] >> bit_idx) & 1;
            val = (val << 1) | bit as u64;
            self.pos += 1;
        }
        Some(val)
    }

    pub fn align_to_byte(&mut self) {
        let rem = self.pos % 8;
        if rem != 0 {
            self.pos += 8 - rem;
        }
    }
}

/// Extract `[start_bit, end_bit)` from `data` into a byte-aligned buffer,
/// left-justifying the first byte so `start_bit` becomes its MSB — the
/// form the codec adapter expects a block's raw payload in.
pub fn extract_bits(data: &[u8], start_bit: u64, end_bit: u64) -> Vec<u8> {
    let total_bits = end_bit.saturating_sub(start_bit);
    let total_bytes = ((total_bits + 7) / 8) as usize;
    let mut out = vec![0u8; total_bytes];
    let mut cur = BitCursor::new(data, start_bit);
    for (i, slot) in out.iter_mut().enumerate() {
        let bits_left = total_bits - (i as u64 * 8);
        let take = bits_left.min(8) as u32;
        if let Some(v) = cur.read_bits(take) {
            *slot = (v as u8) << (8 - take);
        }
    }
    out
}

/// Result of parsing whatever follows a located magic.
pub enum PostBlock {
    /// Another block begins right at the magic that was found.
    NextBlock { bit_offset: u64 },
    /// The stream ended at the magic that was found.
    StreamEnd {
        stream_crc: u32,
        /// `bs100k` of the stream that immediately follows, if any.
        next_stream_bs100k: Option<u8>,
        /// Bit offset of that following stream's header, if any.
        next_stream_bit_offset: Option<u64>,
    },
    /// Not enough data in `data` to parse the trailer; caller should fetch
    /// more bytes and retry from the same `match_bit_offset`.
    NeedMoreData,
}

/// Parse what follows a magic match found at `match_bit_offset` within
/// `data`.
pub fn parse_after_match(data: &[u8], kind: MagicKind, match_bit_offset: u64) -> PostBlock {
    match kind {
        MagicKind::Block => PostBlock::NextBlock {
            bit_offset: match_bit_offset,
        },
        MagicKind::Eos => {
            let mut cur = BitCursor::new(data, match_bit_offset + MAGIC_BITS as u64);
            let stream_crc = match cur.read_bits(32) {
                Some(v) => v as u32,
                None => return PostBlock::NeedMoreData,
            };
            cur.align_to_byte();
            if cur.remaining() < 32 {
                // Either legitimately the end of the file, or the header
                // straddles into the next chunk; caller distinguishes via
                // chunk EOF status.
                return PostBlock::StreamEnd {
                    stream_crc,
                    next_stream_bs100k: None,
                    next_stream_bit_offset: None,
                };
            }
            let header_start = cur.bit_pos();
            let b0 = cur.read_bits(8).unwrap() as u8;
            let b1 = cur.read_bits(8).unwrap() as u8;
            let b2 = cur.read_bits(8).unwrap() as u8;
            let b3 = cur.read_bits(8).unwrap() as u8;
            if b0 == b'B' && b1 == b'Z' && b2 == b'h' && (b'1'..=b'9').contains(&b3) {
                PostBlock::StreamEnd {
                    stream_crc,
                    next_stream_bs100k: Some(b3 - b'0'),
                    next_stream_bit_offset: Some(header_start),
                }
            } else {
                PostBlock::StreamEnd {
                    stream_crc,
                    next_stream_bs100k: None,
                    next_stream_bit_offset: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic_bytes(magic: u64) -> [u8; 6] {
        [
            (magic >> 40) as u8,
            (magic >> 32) as u8,
            (magic >> 24) as u8,
            (magic >> 16) as u8,
            (magic >> 8) as u8,
            magic as u8,
        ]
    }

    #[test]
    fn finds_byte_aligned_block_magic() {
        let scanner = Scanner::new();
        let mut data = vec![0xAAu8, 0xBB];
        data.extend_from_slice(&magic_bytes(MAGIC_BLOCK));
        data.push(0xCC);
        let mut state = ScanState::default();
        let (kind, bit_offset) = scanner.scan(&data, &mut state).expect("should find magic");
        assert_eq!(kind, MagicKind::Block);
        assert_eq!(bit_offset, 16);
    }

    #[test]
    fn finds_bit_misaligned_eos_magic() {
        let scanner = Scanner::new();
        let shift = 3usize;
        let mut bits = vec![0u8; shift];
        for i in 0..48 {
            bits.push(((MAGIC_EOS >> (47 - i)) & 1) as u8);
        }
        bits.extend(std::iter::repeat(1u8).take(5));

        let mut data = vec![0u8; (bits.len() + 7) / 8];
        for (i, &b) in bits.iter().enumerate() {
            if b == 1 {
                data[i / 8] |= 1 << (7 - (i % 8));
            }
        }

        let mut state = ScanState::default();
        let (kind, bit_offset) = scanner.scan(&data, &mut state).expect("should find magic");
        assert_eq!(kind, MagicKind::Eos);
        assert_eq!(bit_offset, shift as u64);
    }

    #[test]
    fn no_match_in_random_bytes() {
        let scanner = Scanner::new();
        let data = vec![0x11u8, 0x22, 0x33, 0x44, 0x55];
        let mut state = ScanState::default();
        assert!(scanner.scan(&data, &mut state).is_none());
    }

    #[test]
    fn straddles_scan_calls() {
        let scanner = Scanner::new();
        let full = magic_bytes(MAGIC_BLOCK);
        let mut state = ScanState::default();
        assert!(scanner.scan(&full[..3], &mut state).is_none());
        let (kind, _bit_offset) = scanner
            .scan(&full[3..], &mut state)
            .expect("should complete match across the split");
        assert_eq!(kind, MagicKind::Block);
    }

    #[test]
    fn parses_eos_with_following_stream_header() {
        let mut bytes = magic_bytes(MAGIC_EOS).to_vec();
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        bytes.extend_from_slice(b"BZh9");
        let result = parse_after_match(&bytes, MagicKind::Eos, 0);
        match result {
            PostBlock::StreamEnd {
                stream_crc,
                next_stream_bs100k,
                next_stream_bit_offset,
            } => {
                assert_eq!(stream_crc, 0xDEAD_BEEF);
                assert_eq!(next_stream_bs100k, Some(9));
                assert_eq!(next_stream_bit_offset, Some(48 + 32));
            }
            _ => panic!("expected StreamEnd"),
        }
    }

    #[test]
    fn parses_eos_at_true_end_of_file() {
        let mut bytes = magic_bytes(MAGIC_EOS).to_vec();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let result = parse_after_match(&bytes, MagicKind::Eos, 0);
        match result {
            PostBlock::StreamEnd {
                next_stream_bs100k, ..
            } => assert_eq!(next_stream_bs100k, None),
            _ => panic!("expected StreamEnd"),
        }
    }
}
