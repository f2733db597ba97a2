//! Streaming decoder: runs the pipeline on a background thread and exposes
//! its output through `std::io::Read`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use memmap2::Mmap;

use crate::error::Result;
use crate::pipeline::{self, Config};

/// Forwards everything written to it as owned chunks over a channel; this
/// is the muxer's `Write` target when running behind [`Bz2Decoder`].
struct ChannelWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "Bz2Decoder reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A `Read` source over a memory-mapped file, handed to the pipeline on its
/// own thread so the mapping stays alive for the decoder's lifetime.
struct MmapReader {
    mmap: Arc<Mmap>,
    pos: usize,
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.mmap[self.pos..];
        let n = buf.len().min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Parallel bzip2 decoder implementing `Read`.
///
/// Construction spawns the whole pipeline (splitter, worker pool, muxer) on
/// background threads and returns immediately; bytes stream out as the
/// muxer produces them, buffered through a bounded channel so a slow reader
/// can't let the pipeline run arbitrarily far ahead.
pub struct Bz2Decoder {
    rx: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    handle: Option<JoinHandle<Result<()>>>,
    finished: bool,
}

impl Bz2Decoder {
    /// Opens a bzip2 file and decodes it via memory-mapped I/O.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::new(MmapReader {
            mmap: Arc::new(mmap),
            pos: 0,
        }))
    }

    /// Decodes from any `Read` source, using `num_workers` decode threads
    /// (defaulting to the number of available CPUs).
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        Self::with_config(reader, Config::new(num_cpus()))
    }

    /// Decodes from any `Read` source under an explicit [`Config`].
    ///
    /// # Architecture
    ///
    /// Spawns the full Splitter/Worker-pool/Muxer pipeline on one background
    /// thread and returns immediately:
    ///
    /// 1. **Splitter**: reads fixed-size chunks from `reader`.
    /// 2. **Worker pool**: `config.num_workers` threads, one scanning the
    ///    chunk chain for block boundaries at a time, all of them decoding
    ///    already-located blocks the rest of the time.
    /// 3. **Muxer**: reassembles decoded sub-blocks in order and writes them
    ///    through a [`ChannelWriter`], which is what `read` below drains.
    ///
    /// # Channel Sizing
    ///
    /// The byte channel is sized at `num_workers * 2` chunks:
    ///
    /// - Enough slack that the muxer rarely blocks on a reader that's
    ///   momentarily behind.
    /// - Small enough that a reader who stops polling entirely still caps
    ///   how far the pipeline can run ahead of it.
    ///
    /// # Arguments
    ///
    /// * `reader` - compressed byte source, moved onto the background thread.
    /// * `config` - worker count and chunk-slot budget for this run.
    ///
    /// # Type Parameters
    ///
    /// * `R` - any `Read + Send + 'static` source; `'static` is required
    ///   because the reader outlives this call, living on the spawned thread.
    pub fn with_config<R: Read + Send + 'static>(reader: R, config: Config) -> Self {
        // Bounded so the pipeline can't buffer unboundedly far ahead of a
        // reader that isn't keeping up.
        let (tx, rx) = bounded(config.num_workers as usize * 2);
        let handle = thread::spawn(move || pipeline::run(reader, ChannelWriter { tx }, config, None));
        Bz2Decoder {
            rx,
            buffer: Vec::new(),
            buffer_pos: 0,
            handle: Some(handle),
            finished: false,
        }
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

impl Read for Bz2Decoder {
    /// Reads decompressed bytes into `buf`.
    ///
    /// The muxer thread already does all the reordering; this side just
    /// drains whatever chunk it wrote next and satisfies reads out of it.
    ///
    /// # Algorithm
    ///
    /// 1. If the current buffer still has unread bytes, copy from it and
    ///    return immediately.
    /// 2. If the pipeline has already finished, return `Ok(0)`.
    /// 3. Otherwise block on the channel for the next written chunk, make it
    ///    the current buffer, and recurse to actually copy into `buf`.
    /// 4. Once the channel closes, join the background thread: its `Result`
    ///    becomes this call's `Err` if the pipeline failed, `Ok(0)` if it
    ///    finished cleanly.
    ///
    /// # Returns
    ///
    /// - `Ok(n)` with `n > 0`: `n` bytes copied into `buf`.
    /// - `Ok(0)`: end of stream, no error.
    /// - `Err(e)`: the pipeline failed; `e` wraps the underlying [`Error`](crate::Error).
    ///
    /// # Performance
    ///
    /// The recursive calls above bottom out after at most one extra channel
    /// receive; each one only runs after `buffer_pos == buffer.len()`, so
    /// there's no risk of it looping.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffer_pos < self.buffer.len() {
            let len = buf.len().min(self.buffer.len() - self.buffer_pos);
            buf[..len].copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + len]);
            self.buffer_pos += len;
            return Ok(len);
        }

        if self.finished {
            return Ok(0);
        }

        match self.rx.recv() {
            Ok(chunk) => {
                self.buffer = chunk;
                self.buffer_pos = 0;
                self.read(buf)
            }
            Err(_) => {
                self.finished = true;
                match self.handle.take().map(|h| h.join().unwrap()) {
                    Some(Err(e)) => Err(io::Error::new(io::ErrorKind::Other, e)),
                    _ => Ok(0),
                }
            }
        }
    }
}
