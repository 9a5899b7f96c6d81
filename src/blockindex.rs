//! Block-match index: splits a buffer into fixed-size blocks, digests each
//! with [`crate::psimm`], and supports searching for the best-matching
//! block against an arbitrary query slice.

use crate::parallel::{self, SlotVec};
use crate::psimm::{self, PsimmContext, PsimmError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("blocklen must be nonzero")]
    ZeroBlockLen,
    #[error(transparent)]
    Psimm(#[from] PsimmError),
    #[error("digesting failed for at least one block")]
    DigestFailed,
}

pub struct BlockIndex {
    ctx: PsimmContext,
    blocklen: usize,
    nblocks: usize,
    digests: Vec<Vec<f64>>,
}

impl BlockIndex {
    /// Split `buf` into `blocklen`-byte blocks (the final block absorbing
    /// the remainder whenever it would otherwise be shorter than
    /// `blocklen / 2`) and digest each with a length-`diglen` perceptual
    /// digest, using up to `workers` threads.
    pub fn build(buf: &[u8], blocklen: usize, diglen: usize, workers: usize) -> Result<Self, IndexError> {
        if blocklen == 0 {
            return Err(IndexError::ZeroBlockLen);
        }

        let ctx = PsimmContext::new(diglen)?;

        let mut nblocks = buf.len() / blocklen;
        if nblocks == 0 || buf.len() - nblocks * blocklen >= blocklen / 2 {
            nblocks += 1;
        }

        let slots: SlotVec<Vec<f64>> = SlotVec::new(nblocks);
        let rc = parallel::for_each(workers.max(1), nblocks, |i| {
            let offset = i * blocklen;
            let len = if i == nblocks - 1 { buf.len() - offset } else { blocklen };
            log::debug!("block index: digesting block {i} ({len} bytes at offset {offset})");
            slots.set(i, ctx.digest(&buf[offset..offset + len]));
            0
        });
        if rc != 0 {
            return Err(IndexError::DigestFailed);
        }

        let digests = slots.into_inner().into_iter().map(|d| d.expect("every block digested")).collect();

        Ok(BlockIndex { ctx, blocklen, nblocks, digests })
    }

    pub fn blocklen(&self) -> usize {
        self.blocklen
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    /// Compare `buf` against every indexed block. Returns the byte offset
    /// (within the original indexed buffer) of the start of the
    /// best-matching block. Ties are broken toward the smallest index.
    pub fn search(&self, buf: &[u8]) -> usize {
        let dig = self.ctx.digest(buf);

        let mut best_score = f64::NEG_INFINITY;
        let mut best_i = 0;
        for (i, block_dig) in self.digests.iter().enumerate() {
            let s = psimm::score(&dig, block_dig);
            if s > best_score {
                best_score = s;
                best_i = i;
            }
        }

        best_i * self.blocklen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_block_absorbs_small_remainder() {
        // blocklen=10, len=24: 2 full blocks (20) + remainder 4 < 5, so the
        // remainder is folded into the second block (nblocks stays 2).
        let buf = vec![0u8; 24];
        let index = BlockIndex::build(&buf, 10, 8, 2).unwrap();
        assert_eq!(index.nblocks(), 2);
    }

    #[test]
    fn large_remainder_becomes_its_own_block() {
        // blocklen=10, len=26: remainder 6 >= 5, so a third block is made.
        let buf = vec![0u8; 26];
        let index = BlockIndex::build(&buf, 10, 8, 2).unwrap();
        assert_eq!(index.nblocks(), 3);
    }

    #[test]
    fn finds_the_matching_block() {
        let mut buf = Vec::new();
        buf.extend(std::iter::repeat(b'a').take(64));
        buf.extend(std::iter::repeat(b'b').take(64));
        buf.extend(std::iter::repeat(b'c').take(64));

        let index = BlockIndex::build(&buf, 64, 16, 2).unwrap();
        let query = vec![b'b'; 64];
        let pos = index.search(&query);
        assert_eq!(pos, 64);
    }

    #[test]
    fn shorter_than_one_block_still_indexes() {
        let buf = vec![42u8; 3];
        let index = BlockIndex::build(&buf, 10, 4, 1).unwrap();
        assert_eq!(index.nblocks(), 1);
    }
}
