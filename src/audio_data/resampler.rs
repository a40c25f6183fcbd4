use crate::error::{Result, SonanceError};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate conversion of whole clips.
///
/// All channels go through one rubato resampler so they stay phase aligned.
/// The filter delay is trimmed and the result cut to the exact converted
/// length, so a clip of `n` frames comes out as `ceil(n * ratio)` frames.
#[derive(Debug, Clone, Copy)]
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(SonanceError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(SonanceError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024).max(1),
        })
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }

    /// Number of frames `frames` input frames convert to.
    pub fn output_frames(&self, frames: usize) -> usize {
        (frames as u64 * self.target_sample_rate as u64).div_ceil(self.source_sample_rate as u64)
            as usize
    }

    /// Converts interleaved samples; a trailing partial frame is dropped.
    pub fn resample_interleaved(&self, interleaved: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved.to_vec());
        }
        let channels = self.channels as usize;
        let frames = interleaved.len() / channels;
        if frames == 0 {
            return Ok(Vec::new());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2,
            channels,
        )
        .map_err(|e| SonanceError::AudioLoading(format!("Failed to create resampler: {e}")))?;

        let delay = resampler.output_delay();
        let expected = self.output_frames(frames);
        let mut planar_in = vec![vec![0.0f32; self.chunk_size]; channels];
        let mut planar_out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
        let mut input_index = 0;

        // keep feeding zero padding until the delayed tail has come out
        while planar_out[0].len() < delay + expected {
            let take = frames.saturating_sub(input_index).min(self.chunk_size);
            for (ch, chunk) in planar_in.iter_mut().enumerate() {
                chunk.fill(0.0);
                for (i, value) in chunk[..take].iter_mut().enumerate() {
                    *value = interleaved[(input_index + i) * channels + ch];
                }
            }
            input_index += take;

            let waves_out = resampler
                .process(&planar_in, None)
                .map_err(|e| SonanceError::AudioLoading(format!("Resampling error: {e}")))?;
            for (out, wave) in planar_out.iter_mut().zip(waves_out) {
                out.extend_from_slice(&wave);
            }
        }

        let mut output = Vec::with_capacity(expected * channels);
        for frame in delay..delay + expected {
            output.extend(planar_out.iter().map(|channel| channel[frame]));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_resampler_creation() {
        let resampler = AudioResampler::new(44100, 48000, 2, None).unwrap();
        assert_eq!(resampler.source_sample_rate(), 44100);
        assert_eq!(resampler.target_sample_rate(), 48000);
        assert!(resampler.resample_ratio() > 1.0);
    }

    #[test]
    fn test_invalid_sample_rates() {
        assert!(AudioResampler::new(0, 48000, 2, None).is_err());
        assert!(AudioResampler::new(44100, 0, 2, None).is_err());
        assert!(AudioResampler::new(44100, 48000, 0, None).is_err());
    }

    #[test]
    fn test_same_rate_is_identity() {
        let resampler = AudioResampler::new(44100, 44100, 1, None).unwrap();
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.resample_interleaved(&samples).unwrap(), samples);
    }

    #[test]
    fn test_output_length_is_exact() {
        let resampler = AudioResampler::new(48000, 44100, 2, Some(256)).unwrap();
        let input = vec![0.0f32; 1000 * 2];
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), 919 * 2);
        assert_eq!(resampler.output_frames(1000), 919);
    }

    #[test]
    fn test_channels_stay_separate_and_aligned() {
        let resampler = AudioResampler::new(22050, 44100, 2, Some(512)).unwrap();
        let frames = 4410;
        let mut input = Vec::with_capacity(frames * 2);
        for n in 0..frames {
            let v = (2.0 * PI * 441.0 * n as f32 / 22050.0).sin() * 0.5;
            input.push(v);
            input.push(-v);
        }
        let output = resampler.resample_interleaved(&input).unwrap();
        assert_eq!(output.len(), frames * 2 * 2);

        // away from the edges the tone survives with its amplitude and phase
        for n in 1000..7000 {
            let expected = (2.0 * PI * 441.0 * n as f32 / 44100.0).sin() * 0.5;
            let left = output[n * 2];
            let right = output[n * 2 + 1];
            assert!((left - expected).abs() < 0.05, "frame {n}: {left} vs {expected}");
            assert!((left + right).abs() < 1e-4);
        }
    }
}
