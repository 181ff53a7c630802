//! Polyphonic voice bank for ostinato.
//!
//! A [`Preset`] wraps N independently compiled copies of an instrument
//! graph behind a summing gate and dispatches notes onto them through a
//! deterministic [`VoiceLedger`] (lowest free slot first, round-robin
//! reuse, drop on exhaustion).

pub mod error;
pub use error::{Error, Result};

pub mod ledger;
pub mod preset;
pub mod tuning;

pub use ledger::{SlotIdx, VoiceLedger};
pub use preset::{ClaimedVoice, Note, Preset, AMP_ENV};
pub use tuning::Tuning;
