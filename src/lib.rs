//! Real-time binaural mixing: positioned sources rendered through HRTF
//! filters, distance attenuation and Doppler, plus flat background streams.
//!
//! A [`Context`] owns the scene and renders fixed-size S16 blocks; an
//! [`Engine`] drives one from the default output device.

pub mod audio_data;
pub mod config;
pub mod context;
pub mod distance;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod format;
pub mod math;
mod mixer;
pub mod object;
pub mod sample;
pub mod source;
pub mod spatial;
pub mod stream;

pub use audio_data::{DecodedAudio, LoadOptions, load_audio_file};
pub use config::ContextDesc;
pub use context::{Context, ObjectHandle};
pub use distance::{AttenuationModel, DistanceModel};
pub use dsp::WindowFunction;
pub use engine::Engine;
pub use error::{Result, SonanceError};
pub use format::{AudioSpec, SampleFormat};
pub use math::Vec3;
pub use object::{DEFAULT_FADEOUT, ObjectId};
pub use sample::Sample;
pub use source::Source;
pub use spatial::{HrtfDataset, SphericalHeadDataset};
pub use stream::{ChannelStream, MemoryStream, Stream};
