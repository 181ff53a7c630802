//! Error types for ostinato-render.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to enumerate devices")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to get device name")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("encode error: {0}")]
    Encode(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
