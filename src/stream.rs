//! Pull-based PCM streams for music and ambience.

use crate::error::{Result, SonanceError};
use crate::format::{AudioSpec, encode_s16};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

/// A decoded PCM source the mixer pulls from on the audio thread.
///
/// Implementations must not block in `read`.
pub trait Stream: Send {
    /// Format of the bytes `read` produces.
    fn spec(&self) -> AudioSpec;

    /// Restarts from the beginning.
    fn rewind(&mut self) -> Result<()>;

    /// Appends up to about `hint` bytes of whole frames to `buffer` and
    /// returns whether more data follows.
    fn read(&mut self, buffer: &mut Vec<u8>, hint: usize) -> Result<bool>;
}

/// A stream over PCM held in memory.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    spec: AudioSpec,
    data: Vec<u8>,
    cursor: usize,
}

impl MemoryStream {
    pub fn new(spec: AudioSpec, data: Vec<u8>) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            data,
            cursor: 0,
        })
    }

    /// Wraps interleaved S16 frames.
    pub fn from_pcm(sample_rate: u32, channels: u16, samples: &[i16]) -> Result<Self> {
        let mut data = Vec::new();
        encode_s16(samples, &mut data);
        Self::new(AudioSpec::s16(sample_rate, channels), data)
    }
}

impl Stream for MemoryStream {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self, buffer: &mut Vec<u8>, hint: usize) -> Result<bool> {
        let frame = self.spec.frame_bytes();
        let wanted = hint.div_ceil(frame).max(1) * frame;
        let end = (self.cursor + wanted).min(self.data.len() - self.data.len() % frame);
        if end > self.cursor {
            buffer.extend_from_slice(&self.data[self.cursor..end]);
            self.cursor = end;
        }
        Ok(self.data.len() - self.cursor >= frame)
    }
}

/// Blocks pushed from another thread, typically a decoder, through a
/// bounded channel. An empty channel is an underrun, a disconnected one the
/// end of the stream.
#[derive(Debug)]
pub struct ChannelStream {
    spec: AudioSpec,
    receiver: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl ChannelStream {
    /// Creates the stream and the sender that feeds it, holding at most
    /// `capacity` blocks in flight.
    pub fn bounded(spec: AudioSpec, capacity: usize) -> Result<(Sender<Vec<u8>>, Self)> {
        spec.validate()?;
        let (sender, receiver) = bounded(capacity);
        Ok((
            sender,
            Self {
                spec,
                receiver,
                leftover: Vec::new(),
            },
        ))
    }
}

impl Stream for ChannelStream {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn rewind(&mut self) -> Result<()> {
        Err(SonanceError::Stream(
            "channel streams cannot be rewound".into(),
        ))
    }

    fn read(&mut self, buffer: &mut Vec<u8>, hint: usize) -> Result<bool> {
        let frame = self.spec.frame_bytes();
        let mut more = true;
        while self.leftover.len() < hint {
            match self.receiver.try_recv() {
                Ok(block) => self.leftover.extend_from_slice(&block),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    more = false;
                    break;
                }
            }
        }
        let whole = self.leftover.len() - self.leftover.len() % frame;
        buffer.extend_from_slice(&self.leftover[..whole]);
        self.leftover.drain(..whole);
        Ok(more || self.leftover.len() >= frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn test_memory_stream_reads_whole_frames() {
        let mut stream = MemoryStream::from_pcm(8000, 2, &[1, 2, 3, 4, 5, 6]).unwrap();
        let mut buffer = Vec::new();
        assert!(stream.read(&mut buffer, 5).unwrap());
        assert_eq!(buffer.len(), 8);
        assert!(!stream.read(&mut buffer, 100).unwrap());
        assert_eq!(buffer.len(), 12);
        assert!(!stream.read(&mut buffer, 100).unwrap());
        assert_eq!(buffer.len(), 12);

        stream.rewind().unwrap();
        buffer.clear();
        assert!(!stream.read(&mut buffer, 1000).unwrap());
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn test_memory_stream_validates_spec() {
        let spec = AudioSpec::new(SampleFormat::U8, 0, 1);
        assert!(MemoryStream::new(spec, vec![0; 4]).is_err());
    }

    #[test]
    fn test_channel_stream_underrun_and_end() {
        let (sender, mut stream) = ChannelStream::bounded(AudioSpec::s16(8000, 1), 4).unwrap();
        let mut buffer = Vec::new();
        assert!(stream.read(&mut buffer, 64).unwrap());
        assert!(buffer.is_empty());

        // odd byte counts are held back until the frame completes
        sender.send(vec![1, 0, 2]).unwrap();
        assert!(stream.read(&mut buffer, 64).unwrap());
        assert_eq!(buffer, vec![1, 0]);
        sender.send(vec![0]).unwrap();
        drop(sender);
        assert!(!stream.read(&mut buffer, 64).unwrap());
        assert_eq!(buffer, vec![1, 0, 2, 0]);
        assert!(stream.rewind().is_err());
    }
}
