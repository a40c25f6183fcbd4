use std::time::Duration;

/// How decoded channels are folded before the audio is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Downmix {
    /// Keep every channel.
    #[default]
    Keep,
    /// Average all channels into one.
    Average,
    /// Keep a single channel (0-indexed).
    Channel(usize),
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Resample to this rate after decoding (None = keep the file's rate)
    pub target_sample_rate: Option<u32>,
    pub downmix: Downmix,
    /// Stop decoding after this much audio (None = whole file)
    pub max_duration: Option<Duration>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_sample_rate(mut self, rate: u32) -> Self {
        self.target_sample_rate = Some(rate);
        self
    }

    pub fn downmix(mut self, downmix: Downmix) -> Self {
        self.downmix = downmix;
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }
}
