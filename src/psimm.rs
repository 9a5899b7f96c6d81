//! Perceptual similarity digests: fixed-length fingerprints of a byte
//! buffer such that two buffers with similar byte-frequency structure score
//! highly against each other under [`score`], even when they don't share
//! long exact substrings. Used by the block-match index to find candidate
//! old-file regions for a new-file block without an exact hash match.

use crate::fft::{Complex, ChirpZLut};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PsimmError {
    #[error("digest length must be nonzero")]
    ZeroLength,
}

struct MapCtx {
    l: usize,
    foldlen: usize,
    lut: ChirpZLut,
    map: [f64; 256],
}

impl MapCtx {
    fn new(l: usize, bits: &[u8; 32]) -> Self {
        let foldlen = 2 * l + 1;
        let mut map = [0f64; 256];
        for (i, slot) in map.iter_mut().enumerate() {
            *slot = if bits[i / 8] & (1 << (i % 8)) != 0 { 1.0 } else { -1.0 };
        }
        MapCtx { l, foldlen, lut: ChirpZLut::new(foldlen), map }
    }

    /// Compute this sub-digest of `buf` (whose byte-frequency histogram is
    /// `bfreq`) into `out`, which must have length `self.l`.
    fn subdigest(&self, buf: &[u8], bfreq: &[u64; 256], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.l);

        // Zero-point adjustment: the mean sign, weighted by sqrt(frequency).
        let mut s = 0.0;
        let mut t = 0.0;
        for i in 0..256 {
            let w = (bfreq[i] as f64).sqrt();
            s += self.map[i] * w;
            t += w;
        }
        let s = if t > 0.0 { s / t } else { 0.0 };

        let mut wmap = [0f64; 256];
        for i in 0..256 {
            wmap[i] = if bfreq[i] == 0 { 0.0 } else { (self.map[i] - s) / (bfreq[i] as f64).sqrt() };
        }

        let mut folded = vec![Complex::new(0.0, 0.0); self.foldlen];
        for (i, &b) in buf.iter().enumerate() {
            folded[i % self.foldlen].re += wmap[b as usize];
        }

        if self.l == 0 {
            return;
        }

        let spectrum = self.lut.transform(&folded);
        for i in 0..self.l {
            out[i] = spectrum[i + 1].norm_sqr();
        }

        let energy: f64 = out.iter().map(|x| x * x).sum();
        if energy > 0.0 {
            let scale = (self.l as f64).sqrt() / energy.sqrt();
            for x in out.iter_mut() {
                *x *= scale;
            }
        }
    }
}

/// Shared, immutable, reentrant digesting context. One context can compute
/// digests from multiple threads concurrently; only the random split
/// between the three sub-digests and the byte-to-sign maps are fixed at
/// construction time.
pub struct PsimmContext {
    l: usize,
    sub: [MapCtx; 3],
    offsets: [usize; 3],
}

impl PsimmContext {
    /// Prepare a context producing length-`l` digests, drawing its
    /// byte-to-sign maps and sub-digest split from the system RNG.
    pub fn new(l: usize) -> Result<Self, PsimmError> {
        if l == 0 {
            return Err(PsimmError::ZeroLength);
        }
        let mut rng = rand::thread_rng();
        let frac0: f64 = rng.gen();
        let frac1: f64 = rng.gen();
        let l0 = l / 4 + ((l as f64) * frac0 * 0.125) as usize;
        let l1 = l / 4 + ((l as f64) * frac1 * 0.125) as usize;
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Ok(Self::build(l, l0, l1, seed))
    }

    /// Deterministic constructor for tests: an explicit seed and an
    /// explicit `(L0, L1)` split (L2 is `l - L0 - L1`) replace the system
    /// RNG entirely.
    pub fn from_seed(l: usize, l0: usize, l1: usize, seed: [u8; 32]) -> Result<Self, PsimmError> {
        if l == 0 || l0 + l1 > l {
            return Err(PsimmError::ZeroLength);
        }
        Ok(Self::build(l, l0, l1, seed))
    }

    fn build(l: usize, l0: usize, l1: usize, seed: [u8; 32]) -> Self {
        let l2 = l - (l0 + l1);
        let mut rng = StdRng::from_seed(seed);
        let mut bits0 = [0u8; 32];
        let mut bits1 = [0u8; 32];
        let mut bits2 = [0u8; 32];
        rng.fill_bytes(&mut bits0);
        rng.fill_bytes(&mut bits1);
        rng.fill_bytes(&mut bits2);

        let sub = [MapCtx::new(l0, &bits0), MapCtx::new(l1, &bits1), MapCtx::new(l2, &bits2)];
        let offsets = [0, l0, l0 + l1];
        PsimmContext { l, sub, offsets }
    }

    /// Length of digests this context produces.
    pub fn digest_len(&self) -> usize {
        self.l
    }

    /// Digest `buf`, producing a vector of length `self.digest_len()`.
    pub fn digest(&self, buf: &[u8]) -> Vec<f64> {
        let mut bfreq = [0u64; 256];
        for &b in buf {
            bfreq[b as usize] += 1;
        }

        let mut dig = vec![0.0; self.l];
        for i in 0..3 {
            let off = self.offsets[i];
            let len = self.sub[i].l;
            self.sub[i].subdigest(buf, &bfreq, &mut dig[off..off + len]);
        }
        dig
    }
}

/// Match score for two digests generated from the same context: the dot
/// product of the vectors. Higher means more similar.
pub fn score(d1: &[f64], d2: &[f64]) -> f64 {
    d1.iter().zip(d2.iter()).map(|(a, b)| a * b).sum()
}
