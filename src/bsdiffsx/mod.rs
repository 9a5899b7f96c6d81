//! The seekable BSDIFFSX patch format: the new file is split into fixed-size
//! windows, each written as an independently bzip2-compressed mini-BSDIFF
//! block behind a segment table, so a reader can reconstruct one window
//! without decompressing the rest of the patch.

mod reader;
mod writer;

pub use reader::{apply_all, Patch};
pub use writer::write;

use std::io;
use thiserror::Error;

/// Segments whose old-file window would exceed this are rejected rather
/// than silently produced: a single window regressing to cover the whole
/// old file defeats the point of a seekable format.
pub const MAX_SEGMENT_OLD_LEN: u64 = 1 << 30;

#[derive(Debug, Error)]
pub enum BsdiffSxError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a BSDIFFSX patch (bad magic)")]
    BadMagic,
    #[error("patch is truncated or its stream lengths don't add up")]
    Truncated,
    #[error("blocklen must be nonzero")]
    ZeroBlockLen,
    #[error("new file size implies too many segments for the declared blocklen")]
    TooManySegments,
    #[error("segment's old-file window is {0} bytes, exceeding the seekable-format limit")]
    SegmentTooLarge(u64),
    #[error("segment index {0} is out of range")]
    SegmentOutOfRange(usize),
    #[error("expected an old-file window of {expected} bytes, got {actual}")]
    OldWindowMismatch { expected: u32, actual: u32 },
    #[error("segment control stream doesn't cover the segment's new-file span")]
    ControlMismatch,
}
