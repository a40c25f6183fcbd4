//! Decoded PCM shared by any number of sources.

use arc_swap::ArcSwap;
use atomic_float::AtomicF32;
use crate::audio_data::DecodedAudio;
use crate::error::{Result, SonanceError};
use crate::format::{self, AudioSpec};
use crate::spatial::Spatializer;
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// PCM held at the output rate in S16, with its own gain and pitch.
///
/// `Sample` is a cheap handle and every clone refers to the same sample.
/// Sources keep a handle rather than a copy, so a new gain, pitch or PCM set
/// on any handle is heard by sources already playing it from the next block.
/// The audio thread reads these without locking.
#[derive(Debug, Clone)]
pub struct Sample {
    shared: Arc<SampleShared>,
    spatializer: Arc<Spatializer>,
}

#[derive(Debug)]
struct SampleShared {
    /// Spec of the context output the sample plays into.
    output: AudioSpec,
    name: ArcSwap<String>,
    gain: AtomicF32,
    pitch: AtomicF32,
    pcm: ArcSwap<SamplePcm>,
}

/// One immutable generation of a sample's frames.
#[derive(Debug)]
pub(crate) struct SamplePcm {
    pub spec: AudioSpec,
    pub data: Vec<i16>,
}

impl SamplePcm {
    pub fn frames(&self) -> usize {
        self.data.len() / self.spec.channels.max(1) as usize
    }
}

impl Sample {
    /// An empty sample bound to the output spec of a context.
    pub(crate) fn new(output: AudioSpec, spatializer: Arc<Spatializer>) -> Self {
        Self {
            shared: Arc::new(SampleShared {
                output,
                name: ArcSwap::from_pointee(String::new()),
                gain: AtomicF32::new(1.0),
                pitch: AtomicF32::new(1.0),
                pcm: ArcSwap::from_pointee(SamplePcm {
                    spec: output,
                    data: Vec::new(),
                }),
            }),
            spatializer,
        }
    }

    /// Loads raw PCM in any supported format, converting it to the output
    /// rate. Mono and stereo data keep their layout; wider layouts are
    /// folded into the output channel count.
    ///
    /// # Errors
    ///
    /// Fails for degenerate specs or when the data holds no whole frame.
    pub fn init(&self, data: &[u8], spec: AudioSpec) -> Result<()> {
        spec.validate()?;
        let output = self.shared.output;
        let channels = if spec.channels <= 2 {
            spec.channels
        } else {
            output.channels
        };
        let target = AudioSpec::s16(output.sample_rate, channels);
        let mut pcm = Vec::new();
        format::convert(&target, &spec, data, &mut pcm)?;
        self.init_pcm(pcm, channels)
    }

    /// Takes decoded audio, resampling it to the output rate with rubato.
    /// Layouts wider than stereo are averaged to mono.
    pub fn init_decoded(&self, audio: &DecodedAudio) -> Result<()> {
        let audio = if audio.channels() > 2 {
            audio.to_mono()
        } else {
            audio.clone()
        };
        let audio = audio.resample(self.shared.output.sample_rate)?;
        self.init_pcm(audio.to_pcm(), audio.channels())
    }

    /// Takes S16 interleaved frames that are already at the output rate.
    pub fn init_pcm(&self, mut data: Vec<i16>, channels: u16) -> Result<()> {
        if channels == 0 || data.len() < channels as usize {
            return Err(SonanceError::InvalidArgument(format!(
                "sample '{}' needs at least one frame",
                self.name()
            )));
        }
        let rate = self.shared.output.sample_rate;
        data.truncate(data.len() - data.len() % channels as usize);
        self.shared.pcm.store(Arc::new(SamplePcm {
            spec: AudioSpec::s16(rate, channels),
            data,
        }));
        Ok(())
    }

    /// Fills the sample with a mono sine tone.
    pub fn generate_sine(&self, frequency: f32, seconds: f32) -> Result<()> {
        if !(frequency > 0.0) || !(seconds > 0.0) {
            return Err(SonanceError::InvalidArgument(format!(
                "sine needs positive frequency and length, got {frequency} Hz for {seconds} s"
            )));
        }
        let rate = self.shared.output.sample_rate as f32;
        let frames = (rate * seconds) as usize;
        let data = (0..frames)
            .map(|i| ((2.0 * PI * frequency * i as f32 / rate).sin() * 0.8 * 32767.0) as i16)
            .collect();
        self.init_pcm(data, 1)
    }

    pub fn is_initialized(&self) -> bool {
        !self.shared.pcm.load().data.is_empty()
    }

    pub fn name(&self) -> String {
        self.shared.name.load().as_ref().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.shared.name.store(Arc::new(name.into()));
    }

    pub fn gain(&self) -> f32 {
        self.shared.gain.load(Ordering::Relaxed)
    }

    pub fn set_gain(&self, gain: f32) {
        self.shared.gain.store(gain, Ordering::Relaxed);
    }

    pub fn pitch(&self) -> f32 {
        self.shared.pitch.load(Ordering::Relaxed)
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.shared.pitch.store(pitch, Ordering::Relaxed);
    }

    pub fn spec(&self) -> AudioSpec {
        self.shared.pcm.load().spec
    }

    pub fn channels(&self) -> u16 {
        self.spec().channels
    }

    pub fn frames(&self) -> usize {
        self.shared.pcm.load().frames()
    }

    pub fn length(&self) -> Duration {
        let pcm = self.shared.pcm.load();
        Duration::from_secs_f64(pcm.frames() as f64 / pcm.spec.sample_rate as f64)
    }

    /// Current frames; a later `init` leaves this generation untouched.
    pub(crate) fn pcm(&self) -> Arc<SamplePcm> {
        self.shared.pcm.load_full()
    }

    pub(crate) fn spatializer(&self) -> &Arc<Spatializer> {
        &self.spatializer
    }
}

#[cfg(test)]
pub(crate) fn test_spatializer() -> Arc<Spatializer> {
    use crate::dsp::WindowFunction;
    use crate::spatial::SphericalHeadDataset;

    Arc::new(
        Spatializer::new(
            Arc::new(SphericalHeadDataset::default()),
            8,
            WindowFunction::Vorbis,
        )
        .unwrap(),
    )
}

#[cfg(test)]
pub(crate) fn test_sample(sample_rate: u32, data: Vec<i16>, channels: u16) -> Sample {
    let sample = Sample::new(AudioSpec::s16(sample_rate, 2), test_spatializer());
    sample.init_pcm(data, channels).unwrap();
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    fn empty(rate: u32) -> Sample {
        Sample::new(AudioSpec::s16(rate, 2), test_spatializer())
    }

    #[test]
    fn test_new_sample_is_uninitialized() {
        let sample = empty(44100);
        assert!(!sample.is_initialized());
        assert_eq!(sample.frames(), 0);
        assert_eq!(sample.gain(), 1.0);
        assert_eq!(sample.pitch(), 1.0);
    }

    #[test]
    fn test_init_converts_to_output_rate() {
        let sample = empty(44100);
        let spec = AudioSpec::new(SampleFormat::U8, 22050, 1);
        sample.init(&[128; 100], spec).unwrap();
        assert!(sample.is_initialized());
        assert_eq!(sample.frames(), 200);
        assert_eq!(sample.spec(), AudioSpec::s16(44100, 1));
        assert!(sample.pcm().data.iter().all(|v| *v == 0));
    }

    #[test]
    fn test_init_rejects_empty_data() {
        let sample = empty(44100);
        assert!(sample.init(&[], AudioSpec::s16(44100, 1)).is_err());
        assert!(sample.init_pcm(vec![1], 2).is_err());
    }

    #[test]
    fn test_generate_sine() {
        let sample = empty(8000);
        sample.set_name("beep");
        sample.generate_sine(1000.0, 0.5).unwrap();
        assert_eq!(sample.name(), "beep");
        assert_eq!(sample.frames(), 4000);
        assert_eq!(sample.length(), Duration::from_millis(500));
        let peak = sample.pcm().data.iter().map(|v| v.unsigned_abs()).max().unwrap();
        assert!(peak > 25000 && peak < 27000);
        assert!(sample.generate_sine(-5.0, 1.0).is_err());
    }

    #[test]
    fn test_handles_share_state() {
        let original = test_sample(44100, vec![1, 2, 3], 1);
        let copy = original.clone();
        copy.set_gain(0.5);
        copy.set_pitch(2.0);
        copy.set_name("shared");
        assert_eq!(original.gain(), 0.5);
        assert_eq!(original.pitch(), 2.0);
        assert_eq!(original.name(), "shared");

        let before = original.pcm();
        copy.init_pcm(vec![7; 4], 2).unwrap();
        assert_eq!(original.frames(), 2);
        assert_eq!(original.channels(), 2);
        assert_eq!(before.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_init_decoded_resamples_and_folds() {
        let sample = empty(16000);
        let quad = DecodedAudio::new(vec![0.5; 800 * 4], 8000, 4);
        sample.init_decoded(&quad).unwrap();
        assert_eq!(sample.channels(), 1);
        assert_eq!(sample.frames(), 1600);

        let stereo = DecodedAudio::new(vec![0.25, -0.25, 0.25, -0.25], 16000, 2);
        sample.init_decoded(&stereo).unwrap();
        assert_eq!(sample.pcm().data, vec![8192, -8192, 8192, -8192]);
    }
}
