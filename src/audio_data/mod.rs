//! Decoding audio files into PCM the mixer can play.

mod decoder;
mod load_options;
mod resampler;

use crate::error::{Result, SonanceError};
use crate::stream::MemoryStream;
use std::sync::Arc;
use std::time::Duration;

pub use decoder::{decode_bytes, load_audio_file};
pub use load_options::{Downmix, LoadOptions};
pub use resampler::AudioResampler;

/// Interleaved f32 PCM straight out of the decoder.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    inner: Arc<DecodedInner>,
}

#[derive(Debug)]
struct DecodedInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl DecodedAudio {
    /// Wraps interleaved samples; a trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let total_frames = samples.len() / channels as usize;
        samples.truncate(total_frames * channels as usize);
        Self {
            inner: Arc::new(DecodedInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.inner.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(
            self.inner.total_frames as u64 * 1_000_000_000 / self.inner.sample_rate as u64,
        )
    }

    /// One channel as mono audio.
    pub fn channel(&self, channel: usize) -> Result<Self> {
        let channels = self.inner.channels as usize;
        if channel >= channels {
            return Err(SonanceError::AudioFormat(format!(
                "Channel {channel} out of range (max: {})",
                channels - 1
            )));
        }
        let samples = self
            .inner
            .samples
            .chunks_exact(channels)
            .map(|frame| frame[channel])
            .collect();
        Ok(Self::new(samples, self.inner.sample_rate, 1))
    }

    /// Averages all channels into one.
    pub fn to_mono(&self) -> Self {
        if self.inner.channels == 1 {
            return self.clone();
        }
        let channels = self.inner.channels as usize;
        let samples = self
            .inner
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(samples, self.inner.sample_rate, 1)
    }

    /// Converts to `target_sample_rate` with rubato.
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }
        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            Some(1024),
        )?;
        let samples = resampler.resample_interleaved(&self.inner.samples)?;
        Ok(Self::new(samples, target_sample_rate, self.inner.channels))
    }

    /// Interleaved S16, saturating.
    pub fn to_pcm(&self) -> Vec<i16> {
        self.inner
            .samples
            .iter()
            .map(|v| (v * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
            .collect()
    }

    /// A stream for [`crate::Context::play`] over this audio.
    pub fn to_stream(&self) -> Result<MemoryStream> {
        MemoryStream::from_pcm(self.inner.sample_rate, self.inner.channels, &self.to_pcm())
    }
}
