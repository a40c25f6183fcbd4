//! Head-related impulse response tables indexed by elevation and azimuth.

use std::f32::consts::PI;

/// One ear's impulse response for a direction.
#[derive(Debug, Clone, Copy)]
pub struct EarResponse<'a> {
    /// Stable identifier of the table row, used to cache derived spectra.
    pub id: u32,
    pub taps: &'a [f32],
}

#[derive(Debug, Clone, Copy)]
pub struct EarResponses<'a> {
    pub left: EarResponse<'a>,
    pub right: EarResponse<'a>,
}

/// Immutable HRIR table.
pub trait HrtfDataset: Send + Sync {
    /// Sample rate the impulse responses were measured at.
    fn sample_rate(&self) -> u32;

    /// Nearest responses for a direction.
    ///
    /// `elevation` is in degrees above the horizontal plane, `azimuth` in
    /// degrees clockwise from straight ahead, in `[0, 360)`. Returns `None`
    /// when the elevation is not covered.
    fn lookup(&self, elevation: f32, azimuth: f32) -> Option<EarResponses<'_>>;
}

/// Elevation bands (degrees) and their azimuth sector counts.
const BANDS: [(i32, usize); 14] = [
    (-40, 56),
    (-30, 60),
    (-20, 72),
    (-10, 72),
    (0, 72),
    (10, 72),
    (20, 72),
    (30, 60),
    (40, 56),
    (50, 45),
    (60, 36),
    (70, 24),
    (80, 12),
    (90, 1),
];

const HEAD_RADIUS: f32 = 0.0875;
const SPEED_OF_SOUND: f32 = 343.0;
/// Smallest high-frequency gain of the head shadow, reached at `SHADOW_ANGLE`.
const SHADOW_MIN_ALPHA: f32 = 0.1;
const SHADOW_ANGLE: f32 = 150.0;
/// (reflection coefficient, A, B, D) of each pinna echo; delays in samples at 44.1 kHz.
const PINNA_ECHOES: [(f32, f32, f32, f32); 2] = [(0.5, 1.0, 2.0, 1.0), (-0.25, 5.0, 4.0, 0.5)];

/// KEMAR-shaped table synthesised from a rigid spherical head.
///
/// Each row is the right-ear response for its direction; the left ear reads
/// the row of the mirrored azimuth. Responses combine a one-pole head-shadow
/// filter with two pinna echoes whose delays depend on elevation.
#[derive(Debug, Clone)]
pub struct SphericalHeadDataset {
    sample_rate: u32,
    taps: usize,
    /// First row index of each band.
    band_offsets: Vec<usize>,
    data: Vec<f32>,
}

impl Default for SphericalHeadDataset {
    fn default() -> Self {
        Self::new(44100, 128)
    }
}

impl SphericalHeadDataset {
    pub fn new(sample_rate: u32, taps: usize) -> Self {
        let rows: usize = BANDS.iter().map(|(_, count)| count).sum();
        let mut data = Vec::with_capacity(rows * taps);
        let mut band_offsets = Vec::with_capacity(BANDS.len());
        let mut offset = 0;
        for &(elevation, count) in &BANDS {
            band_offsets.push(offset);
            for sector in 0..count {
                let azimuth = sector as f32 * 360.0 / count as f32;
                data.extend(synthesize(sample_rate, taps, elevation as f32, azimuth));
            }
            offset += count;
        }
        Self {
            sample_rate,
            taps,
            band_offsets,
            data,
        }
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.taps.max(1)
    }

    fn row(&self, index: usize) -> EarResponse<'_> {
        let start = index * self.taps;
        EarResponse {
            id: index as u32,
            taps: &self.data[start..start + self.taps],
        }
    }
}

impl HrtfDataset for SphericalHeadDataset {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lookup(&self, elevation: f32, azimuth: f32) -> Option<EarResponses<'_>> {
        if !elevation.is_finite() || !azimuth.is_finite() || elevation < -45.0 {
            return None;
        }
        let band = (((elevation + 40.0) / 10.0).round().max(0.0) as usize).min(BANDS.len() - 1);
        let count = BANDS[band].1;
        let step = 360.0 / count as f32;
        let sector = |angle: f32| ((angle.rem_euclid(360.0) / step).round() as usize) % count;

        let base = self.band_offsets[band];
        Some(EarResponses {
            left: self.row(base + sector(360.0 - azimuth)),
            right: self.row(base + sector(azimuth)),
        })
    }
}

/// Right-ear impulse response for a direction.
fn synthesize(sample_rate: u32, taps: usize, elevation: f32, azimuth: f32) -> Vec<f32> {
    let (az, el) = (azimuth.to_radians(), elevation.to_radians());
    // angle between the source and the right ear axis
    let incidence = (az.sin() * el.cos()).clamp(-1.0, 1.0).acos().to_degrees();

    let alpha = (1.0 + SHADOW_MIN_ALPHA / 2.0)
        + (1.0 - SHADOW_MIN_ALPHA / 2.0) * (incidence / SHADOW_ANGLE * PI).cos();
    // bilinear transform of (beta + alpha s) / (beta + s)
    let beta = 2.0 * SPEED_OF_SOUND / HEAD_RADIUS;
    let k = 2.0 * sample_rate as f32;
    let b0 = (beta + alpha * k) / (beta + k);
    let b1 = (beta - alpha * k) / (beta + k);
    let a1 = (beta - k) / (beta + k);

    let mut shadow = vec![0.0f32; taps];
    let mut previous_out = 0.0;
    for (n, out) in shadow.iter_mut().enumerate() {
        let x = if n == 0 { 1.0 } else { 0.0 };
        let x1 = if n == 1 { 1.0 } else { 0.0 };
        *out = b0 * x + b1 * x1 - a1 * previous_out;
        previous_out = *out;
    }

    let rate_scale = sample_rate as f32 / 44100.0;
    let mut response = shadow.clone();
    for &(rho, a, b, d) in &PINNA_ECHOES {
        let delay = (a * (az / 2.0).cos() * (d * (90.0 - elevation)).to_radians().sin() + b)
            * rate_scale;
        let delay = delay.abs().round() as usize;
        for n in delay..taps {
            response[n] += rho * shadow[n - delay];
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_shape() {
        let dataset = SphericalHeadDataset::default();
        let expected: usize = BANDS.iter().map(|(_, c)| c).sum();
        assert_eq!(dataset.rows(), expected);
        assert!(dataset.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_out_of_range_elevation() {
        let dataset = SphericalHeadDataset::default();
        assert!(dataset.lookup(-60.0, 0.0).is_none());
        assert!(dataset.lookup(f32::NAN, 0.0).is_none());
        assert!(dataset.lookup(-42.0, 0.0).is_some());
        assert!(dataset.lookup(120.0, 0.0).is_some());
    }

    #[test]
    fn test_mirrored_sectors() {
        let dataset = SphericalHeadDataset::default();
        let front = dataset.lookup(0.0, 0.0).unwrap();
        assert_eq!(front.left.id, front.right.id);

        let right = dataset.lookup(0.0, 90.0).unwrap();
        let left = dataset.lookup(0.0, 270.0).unwrap();
        assert_eq!(right.left.id, left.right.id);
        assert_eq!(right.right.id, left.left.id);
        assert_ne!(right.left.id, right.right.id);
    }

    #[test]
    fn test_zenith_has_single_sector() {
        let dataset = SphericalHeadDataset::default();
        let a = dataset.lookup(89.0, 10.0).unwrap();
        let b = dataset.lookup(89.0, 200.0).unwrap();
        assert_eq!(a.right.id, b.right.id);
        assert_eq!(a.left.id, a.right.id);
    }

    #[test]
    fn test_facing_ear_is_brighter() {
        let dataset = SphericalHeadDataset::default();
        let responses = dataset.lookup(0.0, 90.0).unwrap();
        // first tap carries the high-frequency gain of the shadow filter
        assert!(responses.right.taps[0] > responses.left.taps[0]);
    }
}
