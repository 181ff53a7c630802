//! Error types for ostinato-graph.

use thiserror::Error;

/// Compile-side error. Render-side code never fails: safety violations
/// produce silence and are counted by the render driver instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid spec at {at}: {reason}")]
    SpecInvalid { at: String, reason: String },

    #[error("missing resource: {0}")]
    MissingResource(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
