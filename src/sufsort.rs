//! Suffix-array construction.
//!
//! The original qsufsort has no inherent size limit, but the suffix-sorting
//! crates available here index with `i32`, so a single call is bounded to
//! `i32::MAX - 1` bytes. See `DESIGN.md` for why this is not a regression
//! for the large-file path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SufsortError {
    #[error("buffer of {0} bytes exceeds the suffix sorter's i32 index limit")]
    TooLarge(usize),
    #[error("suffix sort produced a malformed array")]
    Corrupt,
}

/// Suffix-sort `buf` and return an array `sa` of length `buf.len() + 1` with
/// `sa[0] == buf.len()` (the empty suffix, which always sorts first) and
/// `sa[1..]` a permutation of `0..buf.len()` in ascending lexicographic
/// order of the corresponding suffixes.
pub fn suffix_sort(buf: &[u8]) -> Result<Vec<i64>, SufsortError> {
    if buf.len() >= i32::MAX as usize {
        return Err(SufsortError::TooLarge(buf.len()));
    }

    let sorted = sort_inner(buf);

    let mut sa = Vec::with_capacity(buf.len() + 1);
    sa.push(buf.len() as i64);
    sa.extend(sorted.into_iter().map(|x| x as i64));
    Ok(sa)
}

#[cfg(feature = "diff")]
fn sort_inner(buf: &[u8]) -> Vec<i32> {
    divsufsort::sort(buf).into_parts().1
}

#[cfg(all(feature = "c", not(feature = "diff")))]
fn sort_inner(buf: &[u8]) -> Vec<i32> {
    cdivsufsort::sort(buf).into_parts().1
}

#[cfg(not(any(feature = "diff", feature = "c")))]
fn sort_inner(_buf: &[u8]) -> Vec<i32> {
    compile_error!("bsdiff-align requires either the \"diff\" or \"c\" feature for suffix sorting");
}
