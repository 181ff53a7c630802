//! Declarative pattern syntax.
//!
//! A pattern names the preset it plays, describes how chords are
//! generated, and optionally carries sustain/gap programs, per-event
//! modulators, and a voice-pool size.

use crate::gen::{ProgressionStyle, Scale};
use ostinato_graph::NodeSyntax;
use serde::{Deserialize, Serialize};

/// Iterator ordering over a list of material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IteratorSyntax {
    /// In order, wrapping.
    Cyclic,
    /// Full permutation per window.
    Shuffled,
    /// Uniform with replacement.
    Random,
    /// Hold the inner iterator's value for a time interval.
    #[serde(rename_all = "camelCase")]
    Waiting {
        iterator: Box<IteratorSyntax>,
        time_between_changes: f64,
    },
}

impl Default for IteratorSyntax {
    fn default() -> Self {
        IteratorSyntax::Cyclic
    }
}

/// A list of material plus how to walk it. Falls back to the generator's
/// top-level ordering (or cyclic) when `iterator` is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IteratedList<T> {
    pub values: Vec<T>,
    #[serde(default)]
    pub iterator: Option<IteratorSyntax>,
}

/// Sustain/gap programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationSyntax {
    Fixed(f64),
    Random { min: f64, max: f64 },
    List(Vec<f64>),
}

/// One notated note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSyntax {
    pub midi: u8,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
}

fn default_velocity() -> f64 {
    0.8
}

/// One explicit chord of a fixed pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedEventSyntax {
    pub notes: Vec<NoteSyntax>,
}

/// How chords are produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteGeneratorSyntax {
    /// An explicit finite list of chords, played once through.
    Fixed { events: Vec<FixedEventSyntax> },
    /// Endless uniform sampling of single notes from a scale.
    #[serde(rename_all = "camelCase")]
    ScaleSampler {
        scale: Scale,
        root: u8,
        /// How many octaves above the root to sample from (default 1).
        octaves: Option<u8>,
    },
    /// Endless walk of diatonic triads.
    #[serde(rename_all = "camelCase")]
    ChordProgression {
        scale: Scale,
        root: u8,
        style: Option<ProgressionStyle>,
    },
    /// Single-note melody assembled from independently iterated lists.
    #[serde(rename_all = "camelCase")]
    Melodic {
        scales: IteratedList<Scale>,
        roots: IteratedList<i32>,
        octaves: IteratedList<i32>,
        degrees: IteratedList<i32>,
        ordering: Option<IteratorSyntax>,
    },
}

/// A per-event parameter write: `arrow` evaluated at the event time, the
/// result written into every constant named `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulatorSyntax {
    pub target: String,
    pub arrow: NodeSyntax,
}

/// A complete pattern description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternSyntax {
    /// Also names the preset this pattern plays.
    pub name: String,
    pub note_generator: NoteGeneratorSyntax,
    #[serde(default)]
    pub sustain: Option<DurationSyntax>,
    #[serde(default)]
    pub gap: Option<DurationSyntax>,
    #[serde(default)]
    pub modulators: Vec<ModulatorSyntax>,
    #[serde(default)]
    pub num_voices: Option<usize>,
}

impl PatternSyntax {
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(json).map_err(|e| crate::Error::SpecInvalid {
            at: format!("line {}, column {}", e.line(), e.column()),
            reason: e.to_string(),
        })
    }
}
