//! A small complex FFT kernel, used only to evaluate the chirp-z transform
//! that the perceptual similarity digest needs at an odd length
//! (`foldlen = 2*L + 1`). No general-purpose FFT crate is pulled in: the
//! digest only ever transforms a handful of short, fixed-length buffers, so
//! a direct radix-2 Cooley-Tukey kernel plus a Bluestein wrapper is simpler
//! than wiring up an external dependency for it.

use std::f64::consts::PI;
use std::ops::{Add, Mul, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }

    pub fn from_polar(r: f64, theta: f64) -> Self {
        Complex::new(r * theta.cos(), r * theta.sin())
    }

    pub fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    pub fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(self.re * rhs.re - self.im * rhs.im, self.re * rhs.im + self.im * rhs.re)
    }
}

impl Mul<f64> for Complex {
    type Output = Complex;
    fn mul(self, rhs: f64) -> Complex {
        Complex::new(self.re * rhs, self.im * rhs)
    }
}

fn next_pow2(n: usize) -> usize {
    let mut m = 1usize;
    while m < n {
        m <<= 1;
    }
    m
}

/// In-place iterative radix-2 Cooley-Tukey FFT. `a.len()` must be a power
/// of two.
fn fft_radix2(a: &mut [Complex], invert: bool) {
    let n = a.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two());

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            a.swap(i, j);
        }
    }

    let mut len = 2usize;
    while len <= n {
        let ang = 2.0 * PI / len as f64 * if invert { 1.0 } else { -1.0 };
        let wlen = Complex::from_polar(1.0, ang);
        let mut i = 0usize;
        while i < n {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let u = a[i + k];
                let v = a[i + k + len / 2] * w;
                a[i + k] = u + v;
                a[i + k + len / 2] = u - v;
                w = w * wlen;
            }
            i += len;
        }
        len <<= 1;
    }

    if invert {
        let scale = 1.0 / n as f64;
        for x in a.iter_mut() {
            *x = *x * scale;
        }
    }
}

/// Precomputed Bluestein chirp tables for an odd-length-`foldlen`
/// convolution, reused across every digest computation at that length.
pub struct ChirpZLut {
    foldlen: usize,
    fftlen: usize,
    chirp: Vec<Complex>,
    chirp_fft: Vec<Complex>,
}

impl ChirpZLut {
    pub fn new(foldlen: usize) -> Self {
        let fftlen = next_pow2(2 * foldlen);

        // chirp[k] = exp(-i*pi*k^2/foldlen), used both to pre- and
        // post-multiply the sequence being transformed.
        let mut chirp = Vec::with_capacity(foldlen);
        for k in 0..foldlen {
            let k2 = (k as u128 * k as u128 % (2 * foldlen as u128)) as f64;
            let ang = -PI * k2 / foldlen as f64;
            chirp.push(Complex::from_polar(1.0, ang));
        }

        // b[j] = exp(+i*pi*j^2/foldlen), convolution kernel, mirrored and
        // zero-padded to fftlen, then transformed once up front.
        let mut b = vec![Complex::new(0.0, 0.0); fftlen];
        for j in 0..foldlen {
            let conj = chirp[j].conj();
            b[j] = conj;
            if j != 0 {
                b[fftlen - j] = conj;
            }
        }
        fft_radix2(&mut b, false);

        ChirpZLut { foldlen, fftlen, chirp, chirp_fft: b }
    }

    /// Evaluate the length-`foldlen` DFT of `data` (which must have exactly
    /// `foldlen` entries) via the Bluestein chirp-z transform.
    pub fn transform(&self, data: &[Complex]) -> Vec<Complex> {
        assert_eq!(data.len(), self.foldlen);

        let mut a = vec![Complex::new(0.0, 0.0); self.fftlen];
        for j in 0..self.foldlen {
            a[j] = data[j] * self.chirp[j];
        }
        fft_radix2(&mut a, false);

        for (x, y) in a.iter_mut().zip(self.chirp_fft.iter()) {
            *x = *x * *y;
        }
        fft_radix2(&mut a, true);

        let mut out = Vec::with_capacity(self.foldlen);
        for k in 0..self.foldlen {
            out.push(a[k] * self.chirp[k]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix2_matches_naive_dft() {
        let n = 8;
        let mut a: Vec<Complex> = (0..n).map(|i| Complex::new(i as f64, 0.0)).collect();
        let naive: Vec<Complex> = (0..n)
            .map(|k| {
                let mut sum = Complex::new(0.0, 0.0);
                for j in 0..n {
                    let ang = -2.0 * PI * (j * k) as f64 / n as f64;
                    sum = sum + a[j] * Complex::from_polar(1.0, ang);
                }
                sum
            })
            .collect();
        fft_radix2(&mut a, false);
        for (x, y) in a.iter().zip(naive.iter()) {
            assert!((x.re - y.re).abs() < 1e-6);
            assert!((x.im - y.im).abs() < 1e-6);
        }
    }

    #[test]
    fn chirp_z_matches_naive_dft_at_odd_length() {
        let n = 7;
        let data: Vec<Complex> = (0..n).map(|i| Complex::new((i * i) as f64, 0.0)).collect();
        let naive: Vec<Complex> = (0..n)
            .map(|k| {
                let mut sum = Complex::new(0.0, 0.0);
                for j in 0..n {
                    let ang = -2.0 * PI * (j * k) as f64 / n as f64;
                    sum = sum + data[j] * Complex::from_polar(1.0, ang);
                }
                sum
            })
            .collect();
        let lut = ChirpZLut::new(n);
        let got = lut.transform(&data);
        for (x, y) in got.iter().zip(naive.iter()) {
            assert!((x.re - y.re).abs() < 1e-6, "{} vs {}", x.re, y.re);
            assert!((x.im - y.im).abs() < 1e-6, "{} vs {}", x.im, y.im);
        }
    }
}
