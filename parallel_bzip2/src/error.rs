use thiserror::Error;

/// Fatal conditions the pipeline can raise. Any one of these, once observed
/// by any pipeline thread, tears the whole pipeline down.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt bzip2 block: {0}")]
    DataError(String),

    #[error("unterminated bzip2 block at end of input")]
    UnterminatedBlock,

    #[error("missing bzip2 block header in full input chunk")]
    MissingBlockHeader,

    #[error("bzip2 stream CRC mismatch: expected {expected:#010x}, got {found:#010x}")]
    StreamCrcMismatch { expected: u32, found: u32 },

    #[error("block overrun: block bs100k {block} exceeds stream bs100k {stream}")]
    BlockOverrun { block: u8, stream: u8 },

    #[error("not a valid bzip2 file")]
    NotBzip2,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
