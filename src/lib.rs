//! Large-file aware bsdiff: suffix-array alignment, FFT-based perceptual
//! block matching for locating candidate regions in large files, and two
//! patch formats built on top of the resulting alignment — the classical
//! streaming BSDIFF40 and a seekable, block-indexed format (BSDIFFSX) that
//! supports random-access reads of the reconstructed new file.
//!
//! This crate is library-only: it never writes to stdout/stderr or calls
//! `std::process::exit`. The binaries under `src/bin/` are thin CLI
//! consumers.

pub mod align;
pub mod align_multi;
pub mod blockindex;
pub mod bsdiff40;
pub mod bsdiffsx;
pub mod fft;
pub mod format;
pub mod parallel;
pub mod psimm;
pub mod sufsort;

pub use align::{align, align_with_suffix_array, AlignError, AlignSeg};
pub use align_multi::{align_multi, AlignMultiError};
pub use blockindex::{BlockIndex, IndexError};
pub use psimm::{PsimmContext, PsimmError};
pub use sufsort::{suffix_sort, SufsortError};
