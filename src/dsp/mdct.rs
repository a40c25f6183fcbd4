use super::{Fft, WindowFunction};
use crate::error::{Result, SonanceError};
use num_complex::Complex32;
use std::f32::consts::PI;

/// Windowed MDCT/IMDCT pair of window length N = 2^bits.
///
/// `forward` maps N time samples to M = N/2 coefficients
/// `X[k] = sum x[n] cos(pi/M (n + 1/2 + M/2)(k + 1/2))`, and `inverse` maps
/// them back to N samples scaled by 2/M. Both fold the window into a
/// DCT-IV of size M, which is computed with a complex FFT of size N/4.
///
/// With a power-complementary window applied before `forward` and after
/// `inverse`, overlap-adding consecutive half-overlapped frames reconstructs
/// the input exactly.
#[derive(Debug, Clone)]
pub struct Mdct {
    len: usize,
    fft: Fft,
    window: Vec<f32>,
    /// exp(-i pi (r + 1/8) / M), used before and after the FFT
    twiddles: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    folded: Vec<f32>,
}

impl Mdct {
    pub fn new(bits: u32, window: WindowFunction) -> Result<Self> {
        if bits < 3 {
            return Err(SonanceError::InvalidArgument(format!(
                "MDCT window of 2^{bits} samples is too small, need at least 8"
            )));
        }
        let len = 1usize << bits;
        let half = len / 2;
        let quarter = len / 4;
        let fft = Fft::new(bits - 2)?;
        let twiddles = (0..quarter)
            .map(|r| Complex32::from_polar(1.0, -PI * (r as f32 + 0.125) / half as f32))
            .collect();
        Ok(Self {
            len,
            fft,
            window: window.build(len),
            twiddles,
            spectrum: vec![Complex32::new(0.0, 0.0); quarter],
            folded: vec![0.0; half],
        })
    }

    /// Window length N.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Number of coefficients, N/2.
    pub fn bins(&self) -> usize {
        self.len / 2
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn apply_window(&self, data: &mut [f32]) {
        for (sample, w) in data.iter_mut().zip(&self.window) {
            *sample *= w;
        }
    }

    /// `input` holds N samples, `coeffs` receives N/2 coefficients.
    pub fn forward(&mut self, input: &[f32], coeffs: &mut [f32]) {
        assert_eq!(input.len(), self.len, "MDCT input length mismatch");
        assert_eq!(coeffs.len(), self.len / 2, "MDCT output length mismatch");
        let q = self.len / 4;

        // (a, b, c, d) -> (-c_r - d, a - b_r)
        for j in 0..q {
            self.folded[j] = -input[3 * q - 1 - j] - input[3 * q + j];
            self.folded[q + j] = input[j] - input[2 * q - 1 - j];
        }
        dct_iv(
            &self.fft,
            &self.twiddles,
            &mut self.spectrum,
            &self.folded,
            coeffs,
        );
    }

    /// `coeffs` holds N/2 coefficients, `output` receives N samples.
    pub fn inverse(&mut self, coeffs: &[f32], output: &mut [f32]) {
        assert_eq!(coeffs.len(), self.len / 2, "IMDCT input length mismatch");
        assert_eq!(output.len(), self.len, "IMDCT output length mismatch");
        let q = self.len / 4;
        let m = self.len / 2;

        dct_iv(
            &self.fft,
            &self.twiddles,
            &mut self.spectrum,
            coeffs,
            &mut self.folded,
        );

        // (v1, v2) -> (v2, -v2_r, -v1_r, -v1) * 2 / M
        let scale = 2.0 / m as f32;
        let v = &self.folded;
        for j in 0..q {
            output[j] = v[q + j] * scale;
            output[q + j] = -v[m - 1 - j] * scale;
            output[2 * q + j] = -v[q - 1 - j] * scale;
            output[3 * q + j] = -v[j] * scale;
        }
    }
}

/// DCT-IV of size M through an M/2-point complex FFT:
/// pack even samples with reversed odd ones, rotate, transform, rotate back.
fn dct_iv(
    fft: &Fft,
    twiddles: &[Complex32],
    spectrum: &mut [Complex32],
    input: &[f32],
    output: &mut [f32],
) {
    let m = input.len();
    for (r, slot) in spectrum.iter_mut().enumerate() {
        *slot = Complex32::new(input[2 * r], input[m - 1 - 2 * r]) * twiddles[r];
    }
    fft.forward(spectrum);
    for (k, value) in spectrum.iter().enumerate() {
        let rotated = value * twiddles[k];
        output[2 * k] = rotated.re;
        output[m - 1 - 2 * k] = -rotated.im;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn reference_mdct(input: &[f32]) -> Vec<f32> {
        let m = input.len() / 2;
        (0..m)
            .map(|k| {
                input
                    .iter()
                    .enumerate()
                    .map(|(n, x)| {
                        let phase = std::f64::consts::PI / m as f64
                            * (n as f64 + 0.5 + m as f64 / 2.0)
                            * (k as f64 + 0.5);
                        *x as f64 * phase.cos()
                    })
                    .sum::<f64>() as f32
            })
            .collect()
    }

    #[test]
    fn test_matches_reference_definition() {
        let mut rng = StdRng::seed_from_u64(11);
        for bits in 3..=6 {
            let mut mdct = Mdct::new(bits, WindowFunction::Sine).unwrap();
            let input: Vec<f32> = (0..mdct.len()).map(|_| rng.random_range(-1.0..1.0)).collect();
            let mut coeffs = vec![0.0; mdct.bins()];
            mdct.forward(&input, &mut coeffs);
            for (got, want) in coeffs.iter().zip(reference_mdct(&input)) {
                assert_abs_diff_eq!(*got, want, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_overlap_add_reconstructs() {
        let mut rng = StdRng::seed_from_u64(23);
        let windows = [
            WindowFunction::Sine,
            WindowFunction::Vorbis,
            WindowFunction::KaiserBessel(4.0),
        ];
        for bits in [3u32, 4, 5] {
            for window in windows {
                for _ in 0..20 {
                    let mut mdct = Mdct::new(bits, window).unwrap();
                    let n = mdct.len();
                    let h = n / 2;
                    let signal: Vec<f32> =
                        (0..n + h).map(|_| rng.random_range(-1.0..1.0)).collect();

                    let mut frame = |start: usize| {
                        let mut time = signal[start..start + n].to_vec();
                        mdct.apply_window(&mut time);
                        let mut coeffs = vec![0.0; h];
                        mdct.forward(&time, &mut coeffs);
                        let mut out = vec![0.0; n];
                        mdct.inverse(&coeffs, &mut out);
                        mdct.apply_window(&mut out);
                        out
                    };
                    let first = frame(0);
                    let second = frame(h);

                    for i in 0..h {
                        let rebuilt = first[h + i] + second[i];
                        assert_abs_diff_eq!(rebuilt, signal[h + i], epsilon = 1e-4);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rejects_tiny_windows() {
        assert!(Mdct::new(2, WindowFunction::Sine).is_err());
    }
}
