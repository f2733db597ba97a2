//! pbunzip2 - parallel bzip2 decompressor.
//!
//! Drop-in-flavored CLI around `parallel_bzip2`: reads a `.bz2` file (or
//! stdin), decompresses it across a worker pool, and writes plaintext to a
//! file (or stdout).
//!
//! # Usage
//!
//! ```bash
//! pbunzip2 input.bz2
//! pbunzip2 input.bz2 -o output -j 8
//! pbunzip2 -v input.bz2
//! ```

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use parallel_bzip2::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input bzip2 file ("-" or omitted reads stdin)
    input: Option<PathBuf>,

    /// Output file (defaults to input with ".bz2" stripped, or stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of decode worker threads (default: number of logical cores)
    #[arg(short = 'j', long)]
    jobs: Option<u32>,

    /// Number of chunk slots in flight at once (default: jobs * 3)
    #[arg(long)]
    num_slots: Option<u32>,

    /// Overwrite the output file if it already exists
    #[arg(short, long)]
    force: bool,

    /// Print a progress bar to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let num_workers = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    });
    let mut config = Config::new(num_workers);
    if let Some(slots) = args.num_slots {
        config.num_slots = slots;
    }

    let is_stdin = matches!(&args.input, None) || matches!(&args.input, Some(p) if p.as_os_str() == "-");
    let reader: Box<dyn Read + Send> = if is_stdin {
        Box::new(io::stdin())
    } else {
        let path = args.input.as_ref().unwrap();
        Box::new(File::open(path).with_context(|| format!("failed to open {}", path.display()))?)
    };

    let output_path = args.output.clone().or_else(|| {
        args.input.as_ref().and_then(|p| {
            p.to_str()
                .and_then(|s| s.strip_suffix(".bz2"))
                .map(PathBuf::from)
        })
    });

    let writer: Box<dyn Write> = match &output_path {
        Some(path) => {
            if path.exists() && !args.force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Box::new(
                File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?,
            )
        }
        None => Box::new(io::stdout()),
    };

    let pb = if args.verbose {
        let bar = ProgressBar::new_spinner();
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bytes} decompressed ({bytes_per_sec})",
            )
            .unwrap(),
        );
        Some(bar)
    } else {
        None
    };

    let mut on_progress = |consumed: u64| {
        if let Some(bar) = &pb {
            bar.set_position(consumed);
        }
    };

    parallel_bzip2::decompress(reader, writer, config, Some(&mut on_progress))?;

    if let Some(bar) = &pb {
        bar.finish_with_message("done");
    }

    Ok(())
}
