//! Multi-window alignment: index the old file by block, locate each new
//! block's best old-file candidate region, align each block independently
//! (widening the candidate window by a 1.5x fudge factor to tolerate
//! insertions/deletions between old and new), and concatenate the results
//! without reoptimizing across block seams.

use crate::align::{self, AlignSeg};
use crate::blockindex::{BlockIndex, IndexError};
use crate::parallel::{self, SlotVec};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignMultiError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Align(#[from] align::AlignError),
    #[error("aligning at least one block failed")]
    BlockAlignFailed,
}

/// Align `new` against `old` using `blocklen`-sized windows, `digestlen`-long
/// perceptual digests for locating candidate regions, and up to `ncores`
/// worker threads.
pub fn align_multi(
    new: &[u8],
    old: &[u8],
    blocklen: usize,
    digestlen: usize,
    ncores: usize,
) -> Result<Vec<AlignSeg>, AlignMultiError> {
    log::info!("indexing old file");
    let index = BlockIndex::build(old, blocklen, digestlen, ncores)?;

    let mut nblocks = new.len() / blocklen;
    if nblocks == 0 || new.len() - nblocks * blocklen >= blocklen / 2 {
        nblocks += 1;
    }

    let slots: SlotVec<Vec<AlignSeg>> = SlotVec::new(nblocks);
    log::info!("computing alignments");
    let rc = parallel::for_each(ncores.max(1), nblocks, |i| match align_block(new, old, &index, blocklen, nblocks, i) {
        Ok(segs) => {
            slots.set(i, segs);
            0
        }
        Err(e) => {
            log::warn!("block {i} alignment failed: {e}");
            -1
        }
    });
    if rc != 0 {
        return Err(AlignMultiError::BlockAlignFailed);
    }

    log::info!("combining partial alignments");
    let mut combined = Vec::new();
    for segs in slots.into_inner() {
        for seg in segs.expect("every block aligned") {
            if seg.alen > 0 {
                combined.push(seg);
            } else {
                log::warn!("skipped zero-length alignment segment");
            }
        }
    }
    Ok(combined)
}

fn align_block(
    new: &[u8],
    old: &[u8],
    index: &BlockIndex,
    blocklen: usize,
    nblocks: usize,
    i: usize,
) -> Result<Vec<AlignSeg>, align::AlignError> {
    let nstart = i * blocklen;
    let nblocklen = if i < nblocks - 1 { blocklen } else { new.len() - nstart };
    let new_block = &new[nstart..nstart + nblocklen];

    let mut opos = index.search(new_block);

    // Widen the candidate window by a 1.5x fudge factor on both sides to
    // tolerate data inserted or deleted between old and new.
    let fudge = nblocklen * 3 / 2;
    let mut oblocklen = blocklen;
    if opos > fudge {
        oblocklen += fudge;
        opos -= fudge;
    } else {
        oblocklen += opos;
        opos = 0;
    }
    if opos + oblocklen + fudge < old.len() {
        oblocklen += fudge;
    } else {
        oblocklen = old.len() - opos;
    }

    log::debug!("block {i}: new[{nstart}..{}] vs old[{opos}..{}]", nstart + nblocklen, opos + oblocklen);

    let old_window = &old[opos..opos + oblocklen];
    let mut segs = align::align(old_window, new_block)?;
    for seg in &mut segs {
        seg.npos += nstart as u64;
        seg.opos += opos as u64;
    }
    Ok(segs)
}
