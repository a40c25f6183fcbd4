//! Binaural rendering: HRIR datasets and the per-source MDCT renderer.

mod dataset;
mod hrtf;

pub use dataset::{EarResponse, EarResponses, HrtfDataset, SphericalHeadDataset};
pub use hrtf::{HEAD_RADIUS, HrtfRenderer, SPEED_OF_SOUND, Spatializer};
