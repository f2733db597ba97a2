//! The two work units that flow through the pipeline after the splitter:
//! a [`CompressedBlock`] located by a scanning worker, and the
//! [`DecompressedSubBlock`] slices a decoding worker turns it into.

/// Ordering key for a compressed block: which chunk it started in, and its
/// index among the blocks found within that chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct BlockId {
    pub chunk_id: u64,
    pub bzip2_idx: u64,
}

/// A located, fully-delimited bzip2 block (or an end-of-chunk sentinel
/// carrying only trailing stream metadata), ready for decoding.
pub struct CompressedBlock {
    pub id: BlockId,
    /// True if this is the last block the chunk it started in will yield
    /// (its payload/trailer may still straddle into the next chunk).
    pub last_in_chunk: bool,
    /// Raw compressed payload bytes, byte-aligned, ready to be wrapped with
    /// a synthetic stream header and handed to the inner codec. Empty for
    /// a sentinel block.
    pub payload: Vec<u8>,
    /// Set when this block is the first one of a new stream (its `bs100k`
    /// header digit).
    pub new_stream_bs100k: Option<u8>,
    /// Set when the end-of-stream trailer was parsed immediately after
    /// this block, carrying the stream's stored CRC.
    pub stream_end_crc: Option<u32>,
    /// Byte offset in the original input just past this block's trailer,
    /// used for progress reporting.
    pub end_byte_offset: u64,
    /// True if this unit carries no decodable payload: published for an
    /// input chunk whose only content was trailing magic/CRC bytes.
    pub sentinel: bool,
}

/// Ordering key for a decompressed sub-block: block id plus its slice
/// index within that block's plaintext.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct SubBlockKey {
    pub chunk_id: u64,
    pub bzip2_idx: u64,
    pub sub_idx: u64,
}

impl SubBlockKey {
    pub fn first_of(id: BlockId) -> Self {
        SubBlockKey {
            chunk_id: id.chunk_id,
            bzip2_idx: id.bzip2_idx,
            sub_idx: 0,
        }
    }
}

/// A plaintext slice (at most 1 MiB) produced while decoding a
/// [`CompressedBlock`], the unit the muxer reassembles and writes.
pub struct DecompressedSubBlock {
    pub key: SubBlockKey,
    pub data: Vec<u8>,
    /// True if this is the final slice of its parent block's plaintext.
    pub last_in_block: bool,
    /// True if the parent block was the last one found in its chunk.
    pub last_in_chunk: bool,
    /// Set on the final slice: the parent block's own CRC.
    pub block_crc: Option<u32>,
    /// Set on the final slice: this block's own effective bs100k, as
    /// derived by the codec from the decompressed payload it produced.
    /// Checked against the active stream's declared bs100k by the muxer.
    pub bs100k1: Option<u8>,
    pub new_stream_bs100k: Option<u8>,
    pub stream_end_crc: Option<u32>,
    pub end_byte_offset: u64,
}
