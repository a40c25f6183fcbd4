use crate::error::{Result, SonanceError};
use num_complex::Complex32;
use std::f32::consts::PI;

/// Largest supported transform, 2^20 points.
const MAX_BITS: u32 = 20;

/// In-place radix-2 FFT of a fixed power-of-two size.
///
/// The twiddle table is built once at construction; transforms themselves
/// never allocate.
#[derive(Debug, Clone)]
pub struct Fft {
    bits: u32,
    len: usize,
    /// exp(-2 pi i k / N) for k in 0..N/2
    twiddles: Vec<Complex32>,
}

impl Fft {
    pub fn new(bits: u32) -> Result<Self> {
        if bits > MAX_BITS {
            return Err(SonanceError::InvalidArgument(format!(
                "FFT size 2^{bits} exceeds 2^{MAX_BITS}"
            )));
        }
        let len = 1usize << bits;
        let twiddles = (0..len / 2)
            .map(|k| Complex32::from_polar(1.0, -2.0 * PI * k as f32 / len as f32))
            .collect();
        Ok(Self {
            bits,
            len,
            twiddles,
        })
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Forward transform, unscaled.
    pub fn forward(&self, data: &mut [Complex32]) {
        self.transform(data, false);
    }

    /// Inverse transform, scaled by 1/N.
    pub fn inverse(&self, data: &mut [Complex32]) {
        self.transform(data, true);
        let scale = 1.0 / self.len as f32;
        for value in data.iter_mut() {
            *value *= scale;
        }
    }

    fn transform(&self, data: &mut [Complex32], inverse: bool) {
        assert_eq!(data.len(), self.len, "FFT buffer length mismatch");
        self.scramble(data);

        let mut half = 1;
        while half < self.len {
            let stride = self.len / (2 * half);
            for start in (0..self.len).step_by(2 * half) {
                for k in 0..half {
                    let twiddle = self.twiddles[k * stride];
                    let twiddle = if inverse { twiddle.conj() } else { twiddle };
                    let odd = data[start + k + half] * twiddle;
                    let even = data[start + k];
                    data[start + k] = even + odd;
                    data[start + k + half] = even - odd;
                }
            }
            half *= 2;
        }
    }

    /// Bit-reversal permutation.
    fn scramble(&self, data: &mut [Complex32]) {
        if self.bits == 0 {
            return;
        }
        let shift = usize::BITS - self.bits;
        for i in 0..self.len {
            let j = i.reverse_bits() >> shift;
            if j > i {
                data.swap(i, j);
            }
        }
    }
}
