//! Error types for sonance

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonanceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SonanceError>;
