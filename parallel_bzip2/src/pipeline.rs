//! Top-level orchestration: wires the three queues together and spins up
//! the splitter, worker pool and muxer threads that drive them.

use std::io::{Read, Write};
use std::sync::Mutex;
use std::thread;

use crate::block::SubBlockKey;
use crate::error::{Error, Result};
use crate::ms_queue::MsQueue;
use crate::muxer;
use crate::scanner::Scanner;
use crate::splitter;
use crate::sw_queue::SwQueue;
use crate::wm_queue::WmQueue;
use crate::worker;

/// Tuning knobs for one decompression run.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub num_workers: u32,
    pub num_slots: u32,
}

impl Config {
    /// `num_slots` defaults to three chunks per worker, matching the
    /// teacher's own rule of thumb for keeping every worker fed without
    /// letting the splitter run unboundedly far ahead.
    pub fn new(num_workers: u32) -> Self {
        Config {
            num_workers,
            num_slots: num_workers.saturating_mul(3).max(2),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::Config("num_workers must be at least 1".into()));
        }
        if self.num_slots < self.num_workers + 1 {
            return Err(Error::Config(format!(
                "num_slots ({}) must be at least num_workers + 1 ({})",
                self.num_slots,
                self.num_workers + 1
            )));
        }
        Ok(())
    }
}

/// Runs the full Splitter/Worker-pool/Muxer pipeline: reads bzip2-compressed
/// bytes from `reader`, writes decompressed bytes to `writer`. `progress`,
/// if given, is called from the muxer's thread with the cumulative input
/// byte offset consumed so far.
pub fn run<R, W>(
    reader: R,
    writer: W,
    config: Config,
    mut progress: Option<&mut dyn FnMut(u64)>,
) -> Result<()>
where
    R: Read + Send,
    W: Write,
{
    config.validate()?;

    let sw = SwQueue::new();
    let ms = MsQueue::new(config.num_slots);
    let wm = WmQueue::new(
        config.num_workers,
        SubBlockKey {
            chunk_id: 1,
            bzip2_idx: 0,
            sub_idx: 0,
        },
    );
    let scanner = Scanner::new();
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    let record_error = |slot: &Mutex<Option<Error>>, err: Error| {
        let mut guard = slot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(err);
        }
    };

    thread::scope(|scope| {
        scope.spawn(|| {
            if let Err(e) = splitter::run(reader, &sw, &ms) {
                record_error(&first_error, e);
            }
        });

        for _ in 0..config.num_workers {
            scope.spawn(|| {
                if let Err(e) = worker::run(&sw, &wm, &scanner) {
                    record_error(&first_error, e);
                }
            });
        }

        // The muxer drives the calling thread directly so the caller's
        // `writer` never has to cross a thread boundary.
        if let Err(e) = muxer::run(&wm, &ms, writer, progress.as_deref_mut()) {
            record_error(&first_error, e);
        }
    });

    match first_error.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
