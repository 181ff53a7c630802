//! Centralized error type for the ostinato umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate
//! boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] ostinato_graph::Error),

    #[error("Synth: {0}")]
    Synth(#[from] ostinato_synth::Error),

    #[error("Pattern: {0}")]
    Pattern(#[from] ostinato_pattern::Error),

    #[error("Render: {0}")]
    Render(#[from] ostinato_render::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("pattern '{0}' references a preset that is not loaded")]
    UnknownPreset(String),

    #[error("--duration is required for offline rendering")]
    MissingDuration,

    #[error("signal handler: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
