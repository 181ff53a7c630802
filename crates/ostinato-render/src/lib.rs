//! Render drivers for ostinato.
//!
//! [`BlockRenderer`] is the pull-based contract between a compiled graph
//! and an audio host: time-ramp generation, the closed-gate silence fast
//! path, and f64 → f32 channel broadcast. [`LiveOutput`] pulls it from a
//! CPAL stream; [`offline::render_to_wav`] pulls it into a 32-bit float
//! stereo file.

pub mod error;
pub use error::{Error, Result};

pub mod driver;
pub mod offline;
pub mod output;

pub use driver::{BlockRenderer, RenderStatus};
pub use offline::{render_to_wav, OFFLINE_BLOCK};
pub use output::LiveOutput;
