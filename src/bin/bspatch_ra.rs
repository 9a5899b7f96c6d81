//! Seekable-patch reader: writes `LEN` bytes of the reconstructed new file,
//! starting at `START`, to standard output, reading only the patch segments
//! that range actually touches.

use argh::FromArgs;
use bsdiff_align::bsdiffsx::{BsdiffSxError, Patch};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

#[derive(FromArgs)]
/// Read LEN bytes starting at START of the reconstructed new file.
struct Args {
    /// old (source) file
    #[argh(positional)]
    old: PathBuf,
    /// seekable patch file
    #[argh(positional)]
    patch: PathBuf,
    /// start offset in the reconstructed new file
    #[argh(positional)]
    start: u64,
    /// number of bytes to read
    #[argh(positional)]
    len: u64,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Patch(#[from] BsdiffSxError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn run(args: Args) -> Result<(), AppError> {
    let old = fs::read(&args.old).map_err(|source| AppError::ReadFile { path: args.old.clone(), source })?;
    let patch_bytes = fs::read(&args.patch).map_err(|source| AppError::ReadFile { path: args.patch.clone(), source })?;
    let patch = Patch::open(&patch_bytes)?;

    let new_size = patch.new_size();
    let end = (args.start.saturating_add(args.len)).min(new_size);
    let start = args.start.min(new_size);

    let blocklen = patch.blocklen() as u64;
    let mut out = io::stdout().lock();
    let mut emitted = 0u64;

    let mut i = start / blocklen;
    while i * blocklen < end {
        let window_start = i * blocklen;
        let (ostart, olen) = patch.segment_old_range(i as usize);
        let old_window = &old[ostart as usize..(ostart + olen as u64) as usize];
        let block = patch.read_segment(i as usize, old_window)?;

        let seg_start = if window_start >= start { 0 } else { start - window_start };
        let seg_end = (end - window_start).min(block.len() as u64);
        if seg_end > seg_start {
            out.write_all(&block[seg_start as usize..seg_end as usize])?;
            emitted += seg_end - seg_start;
        }
        i += 1;
    }

    if emitted < args.len {
        log::warn!("reached end of file, read {emitted} / {} bytes", args.len);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
