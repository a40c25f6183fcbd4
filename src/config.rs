//! Configuration for a mixing context

use crate::distance::DistanceModel;
use crate::dsp::WindowFunction;
use crate::error::{Result, SonanceError};

/// Smallest MDCT window accepted (8 samples).
pub const MIN_WINDOW_BITS: u32 = 3;
/// Largest MDCT window accepted (16384 samples).
pub const MAX_WINDOW_BITS: u32 = 14;

#[derive(Debug, Clone)]
pub struct ContextDesc {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback requested from the device.
    pub block_size: usize,
    pub max_sources: usize,
    pub fx_volume: f32,
    pub distance_model: DistanceModel,
    /// log2 of the HRTF analysis window length.
    pub hrtf_window_bits: u32,
    pub window: WindowFunction,
}

impl Default for ContextDesc {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            block_size: 1024,
            max_sources: 8,
            fx_volume: 1.0,
            distance_model: DistanceModel::default(),
            hrtf_window_bits: 9,
            window: WindowFunction::Vorbis,
        }
    }
}

impl ContextDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn fx_volume(mut self, volume: f32) -> Self {
        self.fx_volume = volume;
        self
    }

    pub fn distance_model(mut self, model: DistanceModel) -> Self {
        self.distance_model = model;
        self
    }

    pub fn hrtf_window_bits(mut self, bits: u32) -> Self {
        self.hrtf_window_bits = bits;
        self
    }

    pub fn window(mut self, window: WindowFunction) -> Self {
        self.window = window;
        self
    }

    /// Length of the HRTF analysis window in samples.
    pub fn hrtf_window_size(&self) -> usize {
        1 << self.hrtf_window_bits
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SonanceError::Configuration(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(SonanceError::Configuration(
                "channel count must be greater than 0".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(SonanceError::Configuration(
                "block size must be greater than 0".into(),
            ));
        }
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&self.hrtf_window_bits) {
            return Err(SonanceError::Configuration(format!(
                "HRTF window bits {} outside {}..={}",
                self.hrtf_window_bits, MIN_WINDOW_BITS, MAX_WINDOW_BITS
            )));
        }
        if !(0.0..=1.0).contains(&self.fx_volume) {
            return Err(SonanceError::Configuration(format!(
                "fx volume {} outside [0, 1]",
                self.fx_volume
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let desc = ContextDesc::default();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.hrtf_window_size(), 512);
        assert_eq!(desc.max_sources, 8);
    }

    #[test]
    fn test_builder_and_validation() {
        let desc = ContextDesc::new().sample_rate(48000).channels(1).block_size(256);
        assert_eq!(desc.sample_rate, 48000);
        assert!(desc.validate().is_ok());

        assert!(ContextDesc::new().sample_rate(0).validate().is_err());
        assert!(ContextDesc::new().channels(0).validate().is_err());
        assert!(ContextDesc::new().hrtf_window_bits(2).validate().is_err());
        assert!(ContextDesc::new().fx_volume(1.5).validate().is_err());
    }
}
