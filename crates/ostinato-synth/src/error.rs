//! Error types for ostinato-synth.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] ostinato_graph::Error),

    #[error("a preset needs at least one voice")]
    InvalidVoiceCount,
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
