use super::dataset::{EarResponse, HrtfDataset};
use crate::config::{MAX_WINDOW_BITS, MIN_WINDOW_BITS};
use crate::dsp::{Complex32, Fft, Mdct, WindowFunction};
use crate::error::{Result, SonanceError};
use crate::math::{Vec3, azimuth, elevation_degrees};
use std::f32::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::sync::Arc;

/// Head radius used for the interaural time difference, in metres.
pub const HEAD_RADIUS: f32 = 0.093;
pub const SPEED_OF_SOUND: f32 = 343.0;
/// Spectral tilt applied to the top bin when the mix weight reaches zero.
const MAX_HIGH_FREQUENCY_DECAY: f32 = 0.5;

const LEFT: usize = 0;
const RIGHT: usize = 1;

/// Shared, immutable spatialization settings: the HRIR dataset and the
/// MDCT window every renderer uses.
pub struct Spatializer {
    dataset: Arc<dyn HrtfDataset>,
    window_bits: u32,
    window: WindowFunction,
}

impl fmt::Debug for Spatializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spatializer")
            .field("dataset_rate", &self.dataset.sample_rate())
            .field("window_bits", &self.window_bits)
            .field("window", &self.window)
            .finish()
    }
}

impl Spatializer {
    pub fn new(
        dataset: Arc<dyn HrtfDataset>,
        window_bits: u32,
        window: WindowFunction,
    ) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(SonanceError::InvalidArgument(format!(
                "HRTF window bits {window_bits} outside {MIN_WINDOW_BITS}..={MAX_WINDOW_BITS}"
            )));
        }
        Ok(Self {
            dataset,
            window_bits,
            window,
        })
    }

    pub fn dataset(&self) -> &dyn HrtfDataset {
        self.dataset.as_ref()
    }

    pub fn window_size(&self) -> usize {
        1 << self.window_bits
    }
}

/// Per-source binaural renderer.
///
/// Each call renders whole half-overlapped MDCT windows per ear and keeps
/// the output that did not fit in the block as pending samples, so block
/// sizes need not be multiples of the hop. The overlap tail of each ear is
/// read before it is replaced by the next window's tail.
#[derive(Debug)]
pub struct HrtfRenderer {
    spatializer: Arc<Spatializer>,
    mdct: Mdct,
    /// Transform for impulse responses; grows past the window for long IRs.
    ir_fft: Fft,
    ir_spectrum: Vec<Complex32>,
    time: Vec<f32>,
    coeffs: Vec<f32>,
    overlap: [Vec<f32>; 2],
    pending: [Vec<f32>; 2],
    pending_len: usize,
    magnitudes: [Vec<f32>; 2],
    /// (row id, output rate) the magnitudes were derived for
    cached: [Option<(u32, u32)>; 2],
    /// Whether the continuity state holds binaural output.
    spatial: bool,
}

impl HrtfRenderer {
    pub fn new(spatializer: Arc<Spatializer>) -> Result<Self> {
        let n = spatializer.window_size();
        let h = n / 2;
        Ok(Self {
            mdct: Mdct::new(spatializer.window_bits, spatializer.window)?,
            ir_fft: Fft::new(spatializer.window_bits)?,
            spatializer,
            ir_spectrum: vec![Complex32::new(0.0, 0.0); n],
            time: vec![0.0; n],
            coeffs: vec![0.0; h],
            overlap: [vec![0.0; h], vec![0.0; h]],
            pending: [Vec::new(), Vec::new()],
            pending_len: 0,
            magnitudes: [vec![0.0; h], vec![0.0; h]],
            cached: [None, None],
            spatial: false,
        })
    }

    pub fn window_size(&self) -> usize {
        self.mdct.len()
    }

    /// Source frames `process` may read to produce `frames` output frames.
    pub fn input_frames(&self, frames: usize, sample_rate: u32) -> usize {
        frames + self.window_size() + max_itd_frames(sample_rate)
    }

    /// Source frames to supply for one block: the binaural read-ahead, or
    /// just `frames` when the block can only be copied through.
    pub fn frames_needed(
        &self,
        frames: usize,
        sample_rate: u32,
        dst_channels: usize,
        relative_position: Vec3,
    ) -> usize {
        if renders_flat(dst_channels, relative_position) {
            frames
        } else {
            self.input_frames(frames, sample_rate)
        }
    }

    /// Renders `dst` from `src` as seen from `relative_position` (listener
    /// frame: x right, y forward, z up) and returns how many source frames
    /// were consumed.
    ///
    /// `src` must hold at least `input_frames(dst frames)` frames for the
    /// binaural path; with less, or with a zero position, a mono/planar
    /// output, or no dataset coverage, the block is copied straight through.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        sample_rate: u32,
        dst: &mut [i16],
        dst_channels: usize,
        src: &[i16],
        src_channels: usize,
        relative_position: Vec3,
        fx_volume: f32,
    ) -> usize {
        if dst_channels == 0 || src_channels == 0 {
            return 0;
        }
        let frames = dst.len() / dst_channels;
        let available = src.len() / src_channels;
        if renders_flat(dst_channels, relative_position)
            || available < self.input_frames(frames, sample_rate)
        {
            return self.render_flat(dst, dst_channels, src, src_channels);
        }

        let angle = azimuth(relative_position);
        let elevation = elevation_degrees(relative_position);
        let spatializer = Arc::clone(&self.spatializer);
        let Some(responses) = spatializer
            .dataset
            .lookup(elevation, angle.to_degrees().rem_euclid(360.0))
        else {
            return self.render_flat(dst, dst_channels, src, src_channels);
        };
        let ir_rate = spatializer.dataset.sample_rate();
        if !self.update_magnitudes(LEFT, responses.left, ir_rate, sample_rate)
            || !self.update_magnitudes(RIGHT, responses.right, ir_rate, sample_rate)
        {
            log::debug!(
                "HRTF response for elevation {elevation:.1} unusable, rendering without 3D"
            );
            return self.render_flat(dst, dst_channels, src, src_channels);
        }

        if !self.spatial {
            self.reset();
            self.spatial = true;
        }

        let delays = interaural_delays(angle, sample_rate);
        let gains = interaural_gains(angle);
        let tilt = (1.0 - fx_volume.clamp(0.0, 1.0)) * MAX_HIGH_FREQUENCY_DECAY;
        let hop = self.mdct.bins();

        while self.pending_len < frames {
            let offset = self.pending_len;
            for pending in &mut self.pending {
                if pending.len() < offset + hop {
                    pending.resize(offset + hop, 0.0);
                }
            }
            for ear in [LEFT, RIGHT] {
                self.render_window(ear, src, src_channels, offset, delays[ear], gains[ear], tilt);
            }
            self.pending_len += hop;
        }

        for (i, frame) in dst.chunks_exact_mut(dst_channels).enumerate() {
            let left = self.pending[LEFT][i];
            let right = self.pending[RIGHT][i];
            for (c, out) in frame.iter_mut().enumerate() {
                let value = match c {
                    LEFT => left,
                    RIGHT => right,
                    _ => 0.5 * (left + right),
                };
                *out = to_pcm(value);
            }
        }
        for pending in &mut self.pending {
            pending.copy_within(frames..self.pending_len, 0);
        }
        self.pending_len -= frames;
        frames
    }

    /// Drops `frames` of output the caller advanced past without rendering.
    pub fn skip(&mut self, frames: usize) {
        if frames < self.pending_len {
            for pending in &mut self.pending {
                pending.copy_within(frames..self.pending_len, 0);
            }
            self.pending_len -= frames;
        } else {
            self.reset();
        }
    }

    /// Clears overlap tails and pending output.
    pub fn reset(&mut self) {
        for tail in &mut self.overlap {
            tail.fill(0.0);
        }
        self.pending_len = 0;
    }

    fn render_flat(
        &mut self,
        dst: &mut [i16],
        dst_channels: usize,
        src: &[i16],
        src_channels: usize,
    ) -> usize {
        if self.spatial {
            self.reset();
            self.spatial = false;
        }
        for (out, frame) in dst
            .chunks_exact_mut(dst_channels)
            .zip(src.chunks_exact(src_channels))
        {
            if dst_channels == 1 && src_channels > 1 {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                out[0] = (sum / src_channels as i32) as i16;
                continue;
            }
            for (c, value) in out.iter_mut().enumerate() {
                *value = if c < src_channels { frame[c] } else { frame[0] };
            }
        }
        dst.len() / dst_channels
    }

    /// Renders one window for one ear into `pending[ear][offset..offset + hop]`.
    #[allow(clippy::too_many_arguments)]
    fn render_window(
        &mut self,
        ear: usize,
        src: &[i16],
        src_channels: usize,
        offset: usize,
        delay: usize,
        gain: f32,
        tilt: f32,
    ) {
        let hop = self.mdct.bins();
        let start = offset + delay;
        for (i, slot) in self.time.iter_mut().enumerate() {
            let base = (start + i) * src_channels;
            let frame = &src[base..base + src_channels];
            let sum: f32 = frame.iter().map(|&s| s as f32).sum();
            *slot = sum / (src_channels as f32 * 32768.0);
        }

        self.mdct.apply_window(&mut self.time);
        self.mdct.forward(&self.time, &mut self.coeffs);
        for (k, (coeff, magnitude)) in self
            .coeffs
            .iter_mut()
            .zip(&self.magnitudes[ear])
            .enumerate()
        {
            let decay = 1.0 - tilt * k as f32 / hop as f32;
            *coeff *= magnitude * gain * decay;
        }
        self.mdct.inverse(&self.coeffs, &mut self.time);
        self.mdct.apply_window(&mut self.time);

        let tail = &mut self.overlap[ear];
        let out = &mut self.pending[ear][offset..offset + hop];
        for i in 0..hop {
            out[i] = self.time[i] + tail[i];
            tail[i] = self.time[hop + i];
        }
    }

    /// Derives per-bin magnitudes for one ear from an impulse response,
    /// normalised to unit mean power. Returns false if the response is unusable.
    fn update_magnitudes(
        &mut self,
        ear: usize,
        response: EarResponse<'_>,
        ir_rate: u32,
        sample_rate: u32,
    ) -> bool {
        let key = (response.id, sample_rate);
        if self.cached[ear] == Some(key) {
            return true;
        }
        self.cached[ear] = None;

        let taps = response.taps;
        if taps.is_empty() || taps.iter().any(|t| !t.is_finite()) || ir_rate == 0 {
            return false;
        }
        if taps.len() > self.ir_fft.len() {
            let Ok(fft) = Fft::new(taps.len().next_power_of_two().trailing_zeros()) else {
                return false;
            };
            self.ir_spectrum = vec![Complex32::new(0.0, 0.0); fft.len()];
            self.ir_fft = fft;
        }
        for (i, slot) in self.ir_spectrum.iter_mut().enumerate() {
            *slot = Complex32::new(taps.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.ir_fft.forward(&mut self.ir_spectrum);

        // bin k of the MDCT sits at (k + 1/2) * rate / N, bin j of the IR
        // transform at j * ir_rate / L
        let len = self.ir_fft.len();
        let ratio = sample_rate as f32 / ir_rate as f32 * len as f32 / self.mdct.len() as f32;
        let nyquist = len / 2;
        let magnitudes = &mut self.magnitudes[ear];
        for (k, magnitude) in magnitudes.iter_mut().enumerate() {
            let position = ((k as f32 + 0.5) * ratio).min(nyquist as f32);
            let lower = position.floor() as usize;
            let upper = (lower + 1).min(nyquist);
            let frac = position - lower as f32;
            *magnitude = self.ir_spectrum[lower].norm() * (1.0 - frac)
                + self.ir_spectrum[upper].norm() * frac;
        }

        let energy: f32 = magnitudes.iter().map(|m| m * m).sum();
        if !energy.is_finite() || energy <= f32::EPSILON {
            return false;
        }
        let scale = (magnitudes.len() as f32 / energy).sqrt();
        for magnitude in magnitudes.iter_mut() {
            *magnitude *= scale;
        }
        self.cached[ear] = Some(key);
        true
    }
}

fn renders_flat(dst_channels: usize, relative_position: Vec3) -> bool {
    dst_channels < 2 || relative_position == Vec3::ZERO || !relative_position.is_finite()
}

fn max_itd_frames(sample_rate: u32) -> usize {
    (HEAD_RADIUS / SPEED_OF_SOUND * (FRAC_PI_2 + 1.0) * sample_rate as f32).ceil() as usize + 1
}

/// Read-ahead in frames for [left, right]; the ear nearer the source leads.
fn interaural_delays(angle: f32, sample_rate: u32) -> [usize; 2] {
    // rear directions share the delay of their front mirror image
    let folded = if angle > FRAC_PI_2 {
        PI - angle
    } else if angle < -FRAC_PI_2 {
        -PI - angle
    } else {
        angle
    };
    let offset = -HEAD_RADIUS / SPEED_OF_SOUND * (folded + folded.sin()) * sample_rate as f32;
    let frames = offset.abs() as usize;
    if offset > 0.0 { [frames, 0] } else { [0, frames] }
}

/// Amplitude of [left, right]; left/right ratio is 10^(-sin angle).
fn interaural_gains(angle: f32) -> [f32; 2] {
    let ratio = 10f32.powf(-angle.sin());
    [ratio.min(1.0), ratio.recip().min(1.0)]
}

fn to_pcm(value: f32) -> i16 {
    (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}
