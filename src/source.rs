//! One playing instance of a sample.

use crate::error::{Result, SonanceError};
use crate::format::mix_volume;
use crate::math::Vec3;
use crate::sample::{Sample, SamplePcm};
use crate::spatial::HrtfRenderer;
use std::sync::Arc;

/// Playback state of a sample: cursor, loop and fade bookkeeping, gain,
/// pitch and panning, plus the binaural renderer's continuity state.
///
/// The cursor is counted in sample frames and only moves forward, wrapping
/// when looping.
#[derive(Debug)]
pub struct Source {
    sample: Sample,
    looping: bool,
    delta_position: Vec3,
    gain: f32,
    pitch: f32,
    panning: f32,
    position: i64,
    fadeout: i64,
    fadeout_total: i64,
    renderer: HrtfRenderer,
    input: Vec<i16>,
}

impl Source {
    pub fn new(sample: &Sample) -> Result<Self> {
        Ok(Self {
            renderer: HrtfRenderer::new(Arc::clone(sample.spatializer()))?,
            sample: sample.clone(),
            looping: false,
            delta_position: Vec3::ZERO,
            gain: 1.0,
            pitch: 1.0,
            panning: 0.0,
            position: 0,
            fadeout: 0,
            fadeout_total: 0,
            input: Vec::new(),
        })
    }

    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Offset from the owning object's origin.
    pub fn with_delta_position(mut self, delta: Vec3) -> Self {
        self.delta_position = delta;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    /// -1 is hard left, 1 hard right.
    pub fn with_panning(mut self, panning: f32) -> Self {
        self.panning = panning.clamp(-1.0, 1.0);
        self
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn delta_position(&self) -> Vec3 {
        self.delta_position
    }

    pub fn set_delta_position(&mut self, delta: Vec3) {
        self.delta_position = delta;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
    }

    pub fn panning(&self) -> f32 {
        self.panning
    }

    pub fn set_panning(&mut self, panning: f32) {
        self.panning = panning.clamp(-1.0, 1.0);
    }

    /// Playback cursor in sample frames.
    pub fn cursor(&self) -> usize {
        self.position.max(0) as usize
    }

    pub fn playing(&self) -> bool {
        if self.fadeout_total > 0 && self.fadeout <= 0 {
            return false;
        }
        if self.looping {
            return true;
        }
        self.position < self.sample.frames() as i64
    }

    /// Fades linearly to silence over `seconds`, then stops, looping or not.
    pub fn fade_out(&mut self, seconds: f32) {
        let frames = (self.sample.spec().sample_rate as f32 * seconds.max(0.0)) as i64;
        self.fadeout = frames;
        self.fadeout_total = frames.max(1);
    }

    /// Renders one block into `dst` and returns the weight it should be
    /// mixed at, 0 when the block was skipped.
    ///
    /// `relative_position` is in the listener frame; zero renders without
    /// spatialization. `fx_volume` carries the context and distance gain,
    /// `extra_pitch` the Doppler factor.
    ///
    /// # Errors
    ///
    /// Fails if the sample was never initialised or the combined pitch is
    /// not a positive finite number.
    pub fn process(
        &mut self,
        dst: &mut [i16],
        dst_channels: usize,
        relative_position: Vec3,
        fx_volume: f32,
        extra_pitch: f32,
    ) -> Result<f32> {
        // one generation of the PCM for the whole block
        let pcm = self.sample.pcm();
        if pcm.data.is_empty() {
            return Err(SonanceError::InvalidArgument(format!(
                "source plays uninitialized sample '{}'",
                self.sample.name()
            )));
        }
        let pitch = extra_pitch * self.pitch * self.sample.pitch();
        if !(pitch > 0.0) || !pitch.is_finite() {
            return Err(SonanceError::InvalidArgument(format!(
                "pitch must be positive, got {pitch}"
            )));
        }
        if dst_channels == 0 {
            return Err(SonanceError::InvalidArgument(
                "output needs at least one channel".into(),
            ));
        }

        let frames = dst.len() / dst_channels;
        let volume = (fx_volume * self.gain * self.sample.gain()).min(1.0);
        let len = pcm.frames() as i64;
        if mix_volume(volume) <= 0 {
            self.advance(scaled(frames, pitch), len);
            self.renderer.skip(frames);
            return Ok(0.0);
        }

        let rate = pcm.spec.sample_rate;
        let needed = self
            .renderer
            .frames_needed(frames, rate, dst_channels, relative_position);
        self.fill_input(&pcm, needed, dst_channels, pitch);
        let used = self.renderer.process(
            rate,
            dst,
            dst_channels,
            &self.input,
            dst_channels,
            relative_position,
            fx_volume,
        );
        self.advance(scaled(used, pitch), len);
        Ok(volume)
    }

    /// Moves the cursor past `frames` output frames without rendering.
    pub(crate) fn skip(&mut self, frames: usize) {
        let pitch = self.pitch * self.sample.pitch();
        let len = self.sample.frames() as i64;
        self.advance(scaled(frames, pitch.max(0.0)), len);
        self.renderer.skip(frames);
    }

    /// Moves the cursor `frames` forward through a sample of `len` frames.
    fn advance(&mut self, frames: i64, len: i64) {
        self.position = self.position.saturating_add(frames);
        if self.looping && len > 0 {
            self.position = self.position.rem_euclid(len);
        }
        if self.fadeout_total > 0 {
            self.fadeout = self.fadeout.saturating_sub(frames);
            if self.fadeout <= 0 {
                self.fadeout = 0;
                self.looping = false;
            }
        }
    }

    /// Resamples, loops, pans and fades the next `frames` output frames of
    /// the sample into the input buffer.
    fn fill_input(&mut self, pcm: &SamplePcm, frames: usize, channels: usize, pitch: f32) {
        let data = &pcm.data;
        let src_channels = pcm.spec.channels as usize;
        let src_frames = pcm.frames() as i64;

        self.input.clear();
        self.input.resize(frames * channels, 0);
        for (i, out) in self.input.chunks_exact_mut(channels).enumerate() {
            let step = scaled(i, pitch);
            let mut p = self.position.saturating_add(step);
            if self.looping {
                p = p.rem_euclid(src_frames);
            } else if p >= src_frames {
                break;
            }

            let fade = if self.fadeout_total > 0 {
                let remaining = self.fadeout.saturating_sub(step);
                if remaining <= 0 {
                    break;
                }
                remaining as f32 / self.fadeout_total as f32
            } else {
                1.0
            };

            let base = p as usize * src_channels;
            for (c, value) in out.iter_mut().enumerate() {
                let mut v = data[base + if c < src_channels { c } else { 0 }] as f32;
                if self.panning != 0.0 && channels >= 2 && c < 2 {
                    v *= if c == 0 {
                        1.0 - self.panning
                    } else {
                        1.0 + self.panning
                    };
                }
                *value = (v * fade).clamp(-32767.0, 32767.0) as i16;
            }
        }
    }
}

/// Source frames covered by `frames` output frames; saturates at `i64::MAX`.
fn scaled(frames: usize, pitch: f32) -> i64 {
    (frames as f64 * pitch as f64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::test_sample;

    fn ramp(frames: usize) -> Vec<i16> {
        (0..frames as i16).map(|v| v * 10).collect()
    }

    #[test]
    fn test_playing_follows_cursor() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap();
        assert!(source.playing());
        source.advance(99, 100);
        assert!(source.playing());
        source.advance(1, 100);
        assert!(!source.playing());
    }

    #[test]
    fn test_looping_wraps_and_keeps_playing() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap().with_loop(true);
        source.advance(250, 100);
        assert_eq!(source.cursor(), 50);
        assert!(source.playing());
    }

    #[test]
    fn test_fade_out_disables_loop() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap().with_loop(true);
        source.fade_out(0.05);
        source.advance(49, 100);
        assert!(source.playing());
        assert!(source.is_looping());
        source.advance(1, 100);
        assert!(!source.playing());
        assert!(!source.is_looping());
    }

    #[test]
    fn test_zero_fade_stops_immediately() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap().with_loop(true);
        source.fade_out(0.0);
        assert!(!source.playing());
    }

    #[test]
    fn test_process_rejects_bad_state() {
        let uninitialized = Sample::new(
            crate::format::AudioSpec::s16(1000, 2),
            crate::sample::test_spatializer(),
        );
        let mut blank = Source::new(&uninitialized).unwrap();
        let mut dst = vec![0i16; 8];
        assert!(matches!(
            blank.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0),
            Err(SonanceError::InvalidArgument(_))
        ));

        let sample = test_sample(1000, ramp(10), 1);
        let mut source = Source::new(&sample).unwrap().with_pitch(0.0);
        assert!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).is_err());
        let mut source = Source::new(&sample).unwrap();
        assert!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, -1.0).is_err());
        assert!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, f32::INFINITY).is_err());
        assert!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, f32::NAN).is_err());
        assert_eq!(source.cursor(), 0);
    }

    #[test]
    fn test_huge_pitch_saturates_cursor() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap().with_loop(true);
        let mut dst = vec![0i16; 64];
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1e30).unwrap();
        assert!(source.cursor() < 100);
        assert!(source.playing());

        let mut once = Source::new(&sample).unwrap();
        once.fade_out(1.0);
        once.process(&mut dst, 2, Vec3::X, 1.0, 1e30).unwrap();
        assert!(!once.playing());
    }

    #[test]
    fn test_flat_render_reads_only_the_block() {
        let sample = test_sample(44100, ramp(3000), 1);
        let mut source = Source::new(&sample).unwrap();
        let mut dst = vec![0i16; 512];
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap();
        assert_eq!(source.input.len(), 512);

        source.process(&mut dst, 2, Vec3::X, 1.0, 1.0).unwrap();
        assert_eq!(
            source.input.len(),
            source.renderer.input_frames(256, 44100) * 2
        );
    }

    #[test]
    fn test_sample_changes_reach_playing_source() {
        let sample = test_sample(1000, vec![1000; 100], 1);
        let mut source = Source::new(&sample).unwrap();
        let mut dst = vec![0i16; 8];
        assert_eq!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap(), 1.0);

        sample.set_gain(0.5);
        sample.set_pitch(2.0);
        assert_eq!(source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap(), 0.5);
        assert_eq!(source.cursor(), 12);

        sample.init_pcm(vec![-5; 40], 1).unwrap();
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap();
        assert_eq!(dst, vec![-5; 8]);
    }

    #[test]
    fn test_flat_render_expands_mono() {
        let sample = test_sample(1000, ramp(10), 1);
        let mut source = Source::new(&sample).unwrap();
        let mut dst = vec![0i16; 8];
        let volume = source.process(&mut dst, 2, Vec3::ZERO, 0.5, 1.0).unwrap();
        assert_eq!(volume, 0.5);
        assert_eq!(dst, vec![0, 0, 10, 10, 20, 20, 30, 30]);
        assert_eq!(source.cursor(), 4);
    }

    #[test]
    fn test_panning_and_pitch() {
        let sample = test_sample(1000, ramp(20), 1);
        let mut source = Source::new(&sample)
            .unwrap()
            .with_panning(1.0)
            .with_pitch(2.0);
        let mut dst = vec![0i16; 6];
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap();
        assert_eq!(dst, vec![0, 0, 0, 40, 0, 80]);
        assert_eq!(source.cursor(), 6);
    }

    #[test]
    fn test_end_of_sample_is_silent() {
        let sample = test_sample(1000, vec![100; 3], 1);
        let mut source = Source::new(&sample).unwrap();
        let mut dst = vec![7i16; 10];
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap();
        assert_eq!(dst, vec![100, 100, 100, 100, 100, 100, 0, 0, 0, 0]);
        assert!(!source.playing());
    }

    #[test]
    fn test_fade_ramps_down() {
        let sample = test_sample(1000, vec![1000; 100], 1);
        let mut source = Source::new(&sample).unwrap();
        source.fade_out(0.004);
        let mut dst = vec![0i16; 12];
        source.process(&mut dst, 2, Vec3::ZERO, 1.0, 1.0).unwrap();
        let left: Vec<i16> = dst.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![1000, 750, 500, 250, 0, 0]);
        assert!(!source.playing());
    }

    #[test]
    fn test_inaudible_block_still_advances() {
        let sample = test_sample(1000, ramp(100), 1);
        let mut source = Source::new(&sample).unwrap().with_gain(0.001);
        let mut dst = vec![0i16; 20];
        let volume = source.process(&mut dst, 2, Vec3::X, 1.0, 1.5).unwrap();
        assert_eq!(volume, 0.0);
        assert_eq!(source.cursor(), 15);
    }

    #[test]
    fn test_spatial_render_consumes_block() {
        let sample = test_sample(44100, ramp(3000), 1);
        let mut source = Source::new(&sample).unwrap();
        let mut dst = vec![0i16; 512];
        source.process(&mut dst, 2, Vec3::new(1.0, 1.0, 0.0), 1.0, 1.0).unwrap();
        assert_eq!(source.cursor(), 256);
        assert!(dst.iter().any(|v| *v != 0));
    }
}
