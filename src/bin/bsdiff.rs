//! Classical bsdiff patch builder: suffix-array-aligns `old` against `new`
//! in one shot and writes a streaming BSDIFF40 patch.

use argh::FromArgs;
use bsdiff_align::bsdiff40;
use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

#[derive(FromArgs)]
/// Classical bsdiff: align two files and write a BSDIFF40 patch.
struct Args {
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
    #[error("cannot read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("cannot create {path}: {source}")]
    CreateFile { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Align(#[from] bsdiff_align::AlignError),
    #[error(transparent)]
    Write(#[from] bsdiff40::Bsdiff40Error),
}

fn run(args: Args) -> Result<(), AppError> {
    let old = fs::read(&args.old).map_err(|source| AppError::ReadFile { path: args.old.clone(), source })?;
    let new = fs::read(&args.new).map_err(|source| AppError::ReadFile { path: args.new.clone(), source })?;

    let alignment = bsdiff_align::align(&old, &new)?;

    let mut patch = File::create(&args.patch).map_err(|source| AppError::CreateFile { path: args.patch.clone(), source })?;
    bsdiff40::write(&alignment, &new, &old, &mut patch)?;
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
