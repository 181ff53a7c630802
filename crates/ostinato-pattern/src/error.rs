//! Error types for ostinato-pattern.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] ostinato_graph::Error),

    #[error(transparent)]
    Synth(#[from] ostinato_synth::Error),

    #[error("invalid pattern at {at}: {reason}")]
    SpecInvalid { at: String, reason: String },
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
