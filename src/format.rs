//! PCM sample formats, format conversion and saturating mixing.
//!
//! Everything the mixer produces is signed 16-bit native-endian. The other
//! formats only appear on the input side (sample data, streams) and are
//! converted here, frame by frame, before they reach the core.

use crate::error::{Result, SonanceError};

/// Weight at which a signal is mixed at unity gain.
pub const MAX_MIX_VOLUME: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S8,
    U8,
    S16,
    U16,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => 1,
            SampleFormat::S16 | SampleFormat::U16 => 2,
        }
    }

    /// Wire code: bit 15 marks signed formats, the low byte holds the bit depth.
    pub const fn code(self) -> u16 {
        match self {
            SampleFormat::U8 => 0x0008,
            SampleFormat::S8 => 0x8008,
            SampleFormat::U16 => 0x0010,
            SampleFormat::S16 => 0x8010,
        }
    }
}

impl TryFrom<u16> for SampleFormat {
    type Error = SonanceError;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            0x0008 => Ok(SampleFormat::U8),
            0x8008 => Ok(SampleFormat::S8),
            0x0010 => Ok(SampleFormat::U16),
            0x8010 => Ok(SampleFormat::S16),
            other => Err(SonanceError::InvalidArgument(format!(
                "unsupported sample format code {other:#06x}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioSpec {
    pub const fn new(format: SampleFormat, sample_rate: u32, channels: u16) -> Self {
        Self {
            format,
            sample_rate,
            channels,
        }
    }

    pub const fn s16(sample_rate: u32, channels: u16) -> Self {
        Self::new(SampleFormat::S16, sample_rate, channels)
    }

    pub const fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(SonanceError::InvalidArgument(format!(
                "audio spec needs a non-zero rate and channel count, got {} Hz x {}",
                self.sample_rate, self.channels
            )));
        }
        Ok(())
    }
}

/// Typed view over one PCM sample. Values are handled centred on zero so
/// unsigned formats mix the same way signed ones do.
pub trait PcmSample: Copy + Default + Send + 'static {
    const FORMAT: SampleFormat;
    const MIN: i32;
    const MAX: i32;

    fn read_ne(bytes: &[u8]) -> Self;
    fn to_centered(self) -> i32;
    fn from_centered(value: i32) -> Self;

    fn from_centered_saturating(value: i32) -> Self {
        Self::from_centered(value.clamp(Self::MIN, Self::MAX))
    }

    /// Value rescaled to the signed 16-bit range.
    fn to_s16(self) -> i16 {
        let bits = Self::FORMAT.bytes_per_sample() * 8;
        (self.to_centered() << (16 - bits)) as i16
    }
}

impl PcmSample for i8 {
    const FORMAT: SampleFormat = SampleFormat::S8;
    const MIN: i32 = i8::MIN as i32;
    const MAX: i32 = i8::MAX as i32;

    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
    fn to_centered(self) -> i32 {
        self as i32
    }
    fn from_centered(value: i32) -> Self {
        value as i8
    }
}

impl PcmSample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;
    const MIN: i32 = -128;
    const MAX: i32 = 127;

    fn read_ne(bytes: &[u8]) -> Self {
        bytes[0]
    }
    fn to_centered(self) -> i32 {
        self as i32 - 128
    }
    fn from_centered(value: i32) -> Self {
        (value + 128) as u8
    }
}

impl PcmSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::S16;
    const MIN: i32 = i16::MIN as i32;
    const MAX: i32 = i16::MAX as i32;

    fn read_ne(bytes: &[u8]) -> Self {
        i16::from_ne_bytes([bytes[0], bytes[1]])
    }
    fn to_centered(self) -> i32 {
        self as i32
    }
    fn from_centered(value: i32) -> Self {
        value as i16
    }
}

impl PcmSample for u16 {
    const FORMAT: SampleFormat = SampleFormat::U16;
    const MIN: i32 = -32768;
    const MAX: i32 = 32767;

    fn read_ne(bytes: &[u8]) -> Self {
        u16::from_ne_bytes([bytes[0], bytes[1]])
    }
    fn to_centered(self) -> i32 {
        self as i32 - 32768
    }
    fn from_centered(value: i32) -> Self {
        (value + 32768) as u16
    }
}

/// Quantises a linear gain to a mix weight, rounding half up.
pub fn mix_volume(gain: f32) -> i32 {
    (gain * MAX_MIX_VOLUME as f32 + 0.5).floor() as i32
}

/// Adds `src` into `dst` at `volume / 128`, saturating to the sample range.
pub fn mix<T: PcmSample>(dst: &mut [T], src: &[T], volume: i32) {
    if volume <= 0 {
        return;
    }
    let volume = volume.min(MAX_MIX_VOLUME);
    for (d, s) in dst.iter_mut().zip(src) {
        let value = ((d.to_centered() << 7) + volume * s.to_centered()) >> 7;
        *d = T::from_centered_saturating(value);
    }
}

/// Converts raw PCM bytes in `src_spec` to S16 frames at the rate and
/// channel count of `dst_spec`, appending them to `out`.
///
/// Rate conversion is nearest-sample stepping; a trailing partial frame is
/// ignored.
///
/// # Errors
///
/// Returns an error if either spec is degenerate or the destination format
/// is not S16.
pub fn convert(
    dst_spec: &AudioSpec,
    src_spec: &AudioSpec,
    data: &[u8],
    out: &mut Vec<i16>,
) -> Result<()> {
    dst_spec.validate()?;
    src_spec.validate()?;
    if dst_spec.format != SampleFormat::S16 {
        return Err(SonanceError::AudioFormat(format!(
            "cannot convert into {:?}, only S16 output is supported",
            dst_spec.format
        )));
    }
    match src_spec.format {
        SampleFormat::S8 => convert_typed::<i8>(dst_spec, src_spec, data, out),
        SampleFormat::U8 => convert_typed::<u8>(dst_spec, src_spec, data, out),
        SampleFormat::S16 => convert_typed::<i16>(dst_spec, src_spec, data, out),
        SampleFormat::U16 => convert_typed::<u16>(dst_spec, src_spec, data, out),
    }
    Ok(())
}

fn convert_typed<T: PcmSample>(
    dst_spec: &AudioSpec,
    src_spec: &AudioSpec,
    data: &[u8],
    out: &mut Vec<i16>,
) {
    let width = T::FORMAT.bytes_per_sample();
    let src_ch = src_spec.channels as usize;
    let dst_ch = dst_spec.channels as usize;
    let frame_bytes = src_spec.frame_bytes();
    let src_frames = data.len() / frame_bytes;
    if src_frames == 0 {
        return;
    }

    let sample_at = |frame: usize, channel: usize| -> i32 {
        let offset = frame * frame_bytes + channel * width;
        T::read_ne(&data[offset..offset + width]).to_s16() as i32
    };

    let src_rate = src_spec.sample_rate as u64;
    let dst_rate = dst_spec.sample_rate as u64;
    let dst_frames = (src_frames as u64 * dst_rate / src_rate) as usize;
    out.reserve(dst_frames * dst_ch);

    let mut src_frame = 0usize;
    let mut error = 0i64;
    for _ in 0..dst_frames {
        for c in 0..dst_ch {
            let value = if dst_ch == 1 && src_ch > 1 {
                (0..src_ch).map(|sc| sample_at(src_frame, sc)).sum::<i32>() / src_ch as i32
            } else if c < src_ch {
                sample_at(src_frame, c)
            } else {
                sample_at(src_frame, 0)
            };
            out.push(value as i16);
        }
        // Bresenham stepping through the source frames
        error += 2 * src_rate as i64;
        while error >= 2 * dst_rate as i64 {
            error -= 2 * dst_rate as i64;
            src_frame += 1;
        }
        if src_frame >= src_frames {
            break;
        }
    }
}

/// Serialises S16 samples as native-endian bytes.
pub fn encode_s16(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn bytes_of(samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_s16(samples, &mut out);
        out
    }

    #[test]
    fn test_format_codes() {
        for format in [
            SampleFormat::S8,
            SampleFormat::U8,
            SampleFormat::S16,
            SampleFormat::U16,
        ] {
            assert_eq!(SampleFormat::try_from(format.code()).unwrap(), format);
        }
        assert!(matches!(
            SampleFormat::try_from(0x8020),
            Err(SonanceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unsigned_to_s16() {
        assert_eq!(0u8.to_s16(), -32768);
        assert_eq!(128u8.to_s16(), 0);
        assert_eq!(255u8.to_s16(), 127 << 8);
        assert_eq!(32768u16.to_s16(), 0);
        assert_eq!((-1i8).to_s16(), -256);
    }

    #[test]
    fn test_convert_u8_mono_to_stereo() {
        let src = AudioSpec::new(SampleFormat::U8, 8000, 1);
        let dst = AudioSpec::s16(8000, 2);
        let mut out = Vec::new();
        convert(&dst, &src, &[128, 255, 0], &mut out).unwrap();
        assert_eq!(out, vec![0, 0, 32512, 32512, -32768, -32768]);
    }

    #[test]
    fn test_convert_stereo_to_mono_averages() {
        let src = AudioSpec::s16(8000, 2);
        let dst = AudioSpec::s16(8000, 1);
        let mut out = Vec::new();
        convert(&dst, &src, &bytes_of(&[100, 300, -50, 50]), &mut out).unwrap();
        assert_eq!(out, vec![200, 0]);
    }

    #[test]
    fn test_convert_rate_doubling_repeats_frames() {
        let src = AudioSpec::s16(22050, 1);
        let dst = AudioSpec::s16(44100, 1);
        let mut out = Vec::new();
        convert(&dst, &src, &bytes_of(&[1, 2, 3]), &mut out).unwrap();
        assert_eq!(out, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_convert_rate_halving_skips_frames() {
        let src = AudioSpec::s16(44100, 1);
        let dst = AudioSpec::s16(22050, 1);
        let mut out = Vec::new();
        convert(&dst, &src, &bytes_of(&[1, 2, 3, 4]), &mut out).unwrap();
        assert_eq!(out, vec![1, 3]);
    }

    #[test]
    fn test_convert_rejects_non_s16_output() {
        let src = AudioSpec::s16(44100, 1);
        let dst = AudioSpec::new(SampleFormat::U8, 44100, 1);
        assert!(convert(&dst, &src, &[0, 0], &mut Vec::new()).is_err());
    }

    #[test]
    fn test_mix_volume_rounding() {
        assert_eq!(mix_volume(1.0), 128);
        assert_eq!(mix_volume(0.5), 64);
        assert_eq!(mix_volume(0.003), 0);
        assert_eq!(mix_volume(0.004), 1);
    }

    #[test]
    fn test_mix_saturates() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let a: Vec<i16> = (0..64).map(|_| rng.random()).collect();
            let b: Vec<i16> = (0..64).map(|_| rng.random()).collect();
            let (va, vb): (i32, i32) = (rng.random_range(0..=128), rng.random_range(0..=128));
            let mut out = vec![0i16; 64];
            mix(&mut out, &a, va);
            mix(&mut out, &b, vb);
            for (i, v) in out.iter().enumerate() {
                let first = ((va * a[i] as i32) >> 7).clamp(-32768, 32767);
                let second = (((first << 7) + vb * b[i] as i32) >> 7).clamp(-32768, 32767);
                assert_eq!(*v as i32, second);
            }
        }
        let mut loud = vec![30000i16; 4];
        mix(&mut loud, &[30000; 4], MAX_MIX_VOLUME);
        assert_eq!(loud, vec![i16::MAX; 4]);
        let mut quiet = vec![-30000i16; 4];
        mix(&mut quiet, &[-30000; 4], MAX_MIX_VOLUME);
        assert_eq!(quiet, vec![i16::MIN; 4]);
    }

    #[test]
    fn test_mix_unsigned_centres() {
        let mut dst = vec![128u8, 200];
        mix(&mut dst, &[228u8, 228], MAX_MIX_VOLUME);
        assert_eq!(dst, vec![228, 255]);
    }
}
