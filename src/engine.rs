//! Device output through cpal.

use crate::config::ContextDesc;
use crate::context::Context;
use crate::error::{Result, SonanceError};
use crate::spatial::{HrtfDataset, SphericalHeadDataset};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Drives a [`Context`] from the default output device.
///
/// The device is opened at the context's rate and channel count when it
/// supports them; otherwise its default configuration wins and the context
/// is built to match.
pub struct Engine {
    context: Context,
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(desc: ContextDesc) -> Result<Self> {
        Self::with_dataset(desc, Arc::new(SphericalHeadDataset::default()))
    }

    pub fn with_dataset(mut desc: ContextDesc, dataset: Arc<dyn HrtfDataset>) -> Result<Self> {
        desc.validate()?;
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SonanceError::AudioDevice("No default output device available".into())
        })?;

        let (config, sample_format) = negotiate(&device, &desc)?;
        desc.sample_rate = config.sample_rate.0;
        desc.channels = config.channels;
        log::info!(
            "Output device '{}': {} Hz, {} channels, {:?}",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            context: Context::with_dataset(desc, dataset)?,
            device,
            config,
            sample_format,
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The context this engine renders; clone it to drive the scene.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.create_stream::<f32>()?,
            cpal::SampleFormat::I16 => self.create_stream::<i16>()?,
            cpal::SampleFormat::U16 => self.create_stream::<u16>()?,
            other => {
                return Err(SonanceError::AudioFormat(format!(
                    "Unsupported device sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| SonanceError::AudioDevice(format!("Failed to start stream: {e}")))?;

        self.stream = Some(stream);
        self.is_running.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            self.is_running.store(false, Ordering::Relaxed);
            drop(stream);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames rendered since the engine was created.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    fn create_stream<T>(&self) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<i16>,
    {
        let context = self.context.clone();
        let is_running = Arc::clone(&self.is_running);
        let frames_processed = Arc::clone(&self.frames_processed);
        let channels = self.config.channels as usize;
        let mut scratch: Vec<i16> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    }
                    // grows once to the device's largest period
                    scratch.resize(data.len(), 0);
                    context.process(&mut scratch);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = T::from_sample(*sample);
                    }
                    frames_processed.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| SonanceError::AudioDevice(format!("Failed to build stream: {e}")))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Picks the device configuration closest to `desc`.
fn negotiate(
    device: &cpal::Device,
    desc: &ContextDesc,
) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
    let rate = cpal::SampleRate(desc.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| SonanceError::AudioDevice(format!("Failed to query configs: {e}")))?
        .filter(|c| {
            c.channels() == desc.channels
                && c.min_sample_rate() <= rate
                && rate <= c.max_sample_rate()
        })
        .max_by_key(|c| format_rank(c.sample_format()));

    let chosen = match supported {
        Some(range) => range.with_sample_rate(rate),
        None => {
            let fallback = device.default_output_config().map_err(|e| {
                SonanceError::AudioDevice(format!("Failed to get default config: {e}"))
            })?;
            log::warn!(
                "Device cannot do {} Hz with {} channels, using {} Hz with {}",
                desc.sample_rate,
                desc.channels,
                fallback.sample_rate().0,
                fallback.channels()
            );
            fallback
        }
    };

    let buffer_size = match chosen.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max }
            if (*min..=*max).contains(&(desc.block_size as u32)) =>
        {
            cpal::BufferSize::Fixed(desc.block_size as u32)
        }
        _ => cpal::BufferSize::Default,
    };
    let mut config = chosen.config();
    config.buffer_size = buffer_size;
    Ok((config, chosen.sample_format()))
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 3,
        cpal::SampleFormat::F32 => 2,
        cpal::SampleFormat::U16 => 1,
        _ => 0,
    }
}
