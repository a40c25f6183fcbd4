use crate::audio_data::{DecodedAudio, Downmix, LoadOptions};
use crate::error::{Result, SonanceError};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decodes an audio file with symphonia, then applies `options`.
pub fn load_audio_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    log::debug!("Decoding {}", path.display());
    decode(MediaSourceStream::new(Box::new(file), Default::default()), hint, options)
}

/// Decodes an encoded file already held in memory. `extension` is a format
/// hint such as `"wav"` or `"ogg"`.
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    options: &LoadOptions,
) -> Result<DecodedAudio> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }
    let source = Box::new(Cursor::new(bytes));
    decode(MediaSourceStream::new(source, Default::default()), hint, options)
}

fn decode(mss: MediaSourceStream, hint: Hint, options: &LoadOptions) -> Result<DecodedAudio> {
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SonanceError::AudioLoading(format!("Failed to probe audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SonanceError::AudioLoading("No default audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SonanceError::AudioLoading("Sample rate not found".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| SonanceError::AudioLoading("Channel count not found".to_string()))?
        .count();
    if channels == 0 {
        return Err(SonanceError::AudioFormat("Track has no channels".to_string()));
    }
    if let Downmix::Channel(ch) = options.downmix {
        if ch >= channels {
            return Err(SonanceError::AudioFormat(format!(
                "Channel {ch} out of range (max: {})",
                channels - 1
            )));
        }
    }

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SonanceError::AudioLoading(format!("Failed to create decoder: {e}")))?;

    let max_frames = options
        .max_duration
        .map(|d| (d.as_secs_f64() * sample_rate as f64) as usize)
        .unwrap_or(usize::MAX);
    let mut samples: Vec<f32> = Vec::new();

    while samples.len() / channels < max_frames {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break, // end of stream
            Err(e) => {
                return Err(SonanceError::AudioLoading(format!(
                    "Error reading packet: {e}"
                )));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break,
            Err(Error::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet: {e}");
                continue;
            }
            Err(e) => {
                return Err(SonanceError::AudioLoading(format!(
                    "Error decoding packet: {e}"
                )));
            }
        };

        let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        tmp.copy_interleaved_ref(decoded);
        samples.extend_from_slice(tmp.samples());
    }

    let whole = (samples.len() / channels).min(max_frames) * channels;
    samples.truncate(whole);
    log::debug!(
        "Decoded {} frames at {sample_rate} Hz, {channels} channels",
        whole / channels
    );

    let mut audio = DecodedAudio::new(samples, sample_rate, channels as u16);
    audio = match options.downmix {
        Downmix::Keep => audio,
        Downmix::Average => audio.to_mono(),
        Downmix::Channel(ch) => audio.channel(ch)?,
    };
    if let Some(target_rate) = options.target_sample_rate {
        audio = audio.resample(target_rate)?;
    }
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// 16-bit PCM WAV in memory.
    fn wav(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    fn stereo_ramp(frames: usize) -> Vec<i16> {
        (0..frames)
            .flat_map(|n| [n as i16 * 8, -(n as i16) * 8])
            .collect()
    }

    #[test]
    fn test_decode_wav_bytes() {
        let bytes = wav(8000, 2, &stereo_ramp(600));
        let audio = decode_bytes(bytes, Some("wav"), &LoadOptions::default()).unwrap();
        assert_eq!(audio.sample_rate(), 8000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.total_frames(), 600);
        assert_eq!(audio.samples()[2], 8.0 / 32768.0);
        assert_eq!(audio.samples()[3], -8.0 / 32768.0);
        assert_eq!(audio.to_pcm()[..4], [0, 0, 8, -8]);
    }

    #[test]
    fn test_downmix_and_limit() {
        let bytes = wav(8000, 2, &stereo_ramp(800));
        let options = LoadOptions::new()
            .downmix(Downmix::Channel(1))
            .max_duration(Duration::from_millis(50));
        let audio = decode_bytes(bytes.clone(), Some("wav"), &options).unwrap();
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.total_frames(), 400);
        assert_eq!(audio.to_pcm()[10], -80);

        let averaged =
            decode_bytes(bytes, Some("wav"), &LoadOptions::new().downmix(Downmix::Average))
                .unwrap();
        assert!(averaged.samples().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_bad_channel_and_garbage() {
        let bytes = wav(8000, 1, &[1, 2, 3]);
        let options = LoadOptions::new().downmix(Downmix::Channel(1));
        assert!(matches!(
            decode_bytes(bytes, Some("wav"), &options),
            Err(SonanceError::AudioFormat(_))
        ));
        assert!(matches!(
            decode_bytes(vec![0u8; 64], None, &LoadOptions::default()),
            Err(SonanceError::AudioLoading(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_audio_file("/nonexistent/clip.wav", &LoadOptions::default()),
            Err(SonanceError::Io(_))
        ));
    }

    #[test]
    fn test_load_resamples_from_disk() {
        let path = std::env::temp_dir().join(format!("sonance-decode-{}.wav", std::process::id()));
        std::fs::write(&path, wav(22050, 2, &stereo_ramp(2205))).unwrap();
        let audio =
            load_audio_file(&path, &LoadOptions::new().target_sample_rate(44100)).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.total_frames(), 4410);
        assert_eq!(audio.duration(), Duration::from_millis(100));
    }
}
