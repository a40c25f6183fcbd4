//! Spectral transforms used by the HRTF renderer.

mod fft;
mod mdct;
mod window;

pub use fft::Fft;
pub use mdct::Mdct;
pub use window::WindowFunction;

pub use num_complex::Complex32;
