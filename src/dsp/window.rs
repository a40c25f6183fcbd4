use std::f64::consts::PI;

/// Analysis/synthesis windows for the MDCT.
///
/// Every variant is symmetric and power-complementary,
/// `w(n)^2 + w(n + N/2)^2 = 1`, which is what makes windowed overlap-add
/// cancel the MDCT time-domain aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WindowFunction {
    Sine,
    /// Power-sine window from the Vorbis codec.
    #[default]
    Vorbis,
    /// Kaiser-Bessel-derived window with the given alpha.
    KaiserBessel(f32),
}

impl WindowFunction {
    /// Builds the full window table of length `n`.
    pub fn build(self, n: usize) -> Vec<f32> {
        match self {
            WindowFunction::Sine => (0..n)
                .map(|i| (PI * (i as f64 + 0.5) / n as f64).sin() as f32)
                .collect(),
            WindowFunction::Vorbis => (0..n)
                .map(|i| {
                    let s = (PI * (i as f64 + 0.5) / n as f64).sin();
                    (PI / 2.0 * s * s).sin() as f32
                })
                .collect(),
            WindowFunction::KaiserBessel(alpha) => kaiser_bessel_derived(n, alpha as f64),
        }
    }
}

fn kaiser_bessel_derived(n: usize, alpha: f64) -> Vec<f32> {
    let half = n / 2;
    let kernel: Vec<f64> = (0..=half)
        .map(|j| {
            let r = 2.0 * j as f64 / half as f64 - 1.0;
            bessel_i0(PI * alpha * (1.0 - r * r).max(0.0).sqrt())
        })
        .collect();
    let total: f64 = kernel.iter().sum();

    let mut window = vec![0.0f32; n];
    let mut running = 0.0;
    for i in 0..half {
        running += kernel[i];
        let value = (running / total).sqrt() as f32;
        window[i] = value;
        window[n - 1 - i] = value;
    }
    window
}

/// Zeroth-order modified Bessel function of the first kind, power series.
fn bessel_i0(x: f64) -> f64 {
    let quarter_sq = x * x / 4.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;
    while term > sum * 1e-12 {
        term *= quarter_sq / (k * k);
        sum += term;
        k += 1.0;
    }
    sum
}
