//! Large-file bsdiff patch builder: indexes `old` by block, aligns `new`
//! against it in parallel windows, and writes a seekable BSDIFFSX patch.

use argh::FromArgs;
use bsdiff_align::align_multi::AlignMultiError;
use bsdiff_align::bsdiffsx::{self, BsdiffSxError};
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

const BLOCKSIZE_MIN: u32 = 1 << 9;
const BLOCKSIZE_MAX: u32 = 1 << 28;
const DIGLEN_MIN: usize = 16;
const DIGLEN_MAX: usize = 65536;
const NCORES_MIN: usize = 1;
const NCORES_MAX: usize = 64;

#[derive(FromArgs)]
/// Large-file aware bsdiff: index, align in blocks, and write a seekable patch.
struct Args {
    /// block size in bytes, in [2^9, 2^28]
    #[argh(option, short = 'B', default = "1 << 20")]
    blocksize: u32,
    /// perceptual digest length, in [16, 65536]
    #[argh(option, short = 'L', default = "8000")]
    diglen: usize,
    /// worker thread count, in [1, 64]
    #[argh(option, short = 'P', default = "1")]
    ncores: usize,
    /// old (source) file
    #[argh(positional)]
    old: PathBuf,
    /// new (target) file
    #[argh(positional)]
    new: PathBuf,
    /// output patch path
    #[argh(positional)]
    patch: PathBuf,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("-B {0} out of range [2^9, 2^28]")]
    BlockSizeRange(u32),
    #[error("-L {0} out of range [16, 65536]")]
    DiglenRange(usize),
    #[error("-P {0} out of range [1, 64]")]
    NcoresRange(usize),
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("cannot create {path}: {source}")]
    CreateFile { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Align(#[from] AlignMultiError),
    #[error(transparent)]
    Write(#[from] BsdiffSxError),
}

fn run(args: Args) -> Result<(), AppError> {
    if args.blocksize < BLOCKSIZE_MIN || args.blocksize > BLOCKSIZE_MAX {
        return Err(AppError::BlockSizeRange(args.blocksize));
    }
    if args.diglen < DIGLEN_MIN || args.diglen > DIGLEN_MAX {
        return Err(AppError::DiglenRange(args.diglen));
    }
    if args.ncores < NCORES_MIN || args.ncores > NCORES_MAX {
        return Err(AppError::NcoresRange(args.ncores));
    }

    let old = fs::read(&args.old).map_err(|source| AppError::ReadFile { path: args.old.clone(), source })?;
    let new = fs::read(&args.new).map_err(|source| AppError::ReadFile { path: args.new.clone(), source })?;

    log::info!("indexing old file");
    let alignment = bsdiff_align::align_multi(&new, &old, args.blocksize as usize, args.diglen, args.ncores)?;

    log::info!("writing out patch file");
    let mut patch = File::create(&args.patch).map_err(|source| AppError::CreateFile { path: args.patch.clone(), source })?;
    bsdiffsx::write(&alignment, &new, &old, args.blocksize, &mut patch)?;
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
