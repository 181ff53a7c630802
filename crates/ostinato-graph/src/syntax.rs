//! Declarative instrument syntax.
//!
//! The JSON form is a tree of single-key objects whose key names the node
//! kind (serde's externally tagged representation), e.g.
//!
//! ```json
//! {
//!   "compose": [
//!     { "prod": [ { "const": { "name": "freq", "value": 440.0 } }, "identity" ] },
//!     { "osc": { "name": "osc1", "shape": "sine" } }
//!   ]
//! }
//! ```
//!
//! A preset may carry a `library` of reusable sub-trees; entries may
//! reference earlier entries (never themselves or later ones) via
//! `{ "lib": { "name": ... } }`.

use crate::params::{EventField, OscShape};
use serde::{Deserialize, Serialize};

/// One node of the instrument tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeSyntax {
    /// Pass the input through unchanged.
    Identity,
    Const {
        name: Option<String>,
        value: f64,
    },
    /// `2^v` octave offset.
    ConstOctave {
        name: Option<String>,
        value: f64,
    },
    /// `2^(v/1200)` cent offset.
    ConstCent {
        name: Option<String>,
        value: f64,
    },
    /// `1/v`.
    ReciprocalConst {
        name: Option<String>,
        value: f64,
    },
    Reciprocal {
        input: Box<NodeSyntax>,
    },
    Sum(Vec<NodeSyntax>),
    Prod(Vec<NodeSyntax>),
    Compose(Vec<NodeSyntax>),
    Osc {
        name: Option<String>,
        shape: OscShape,
        /// Pulse width input; defaults to a constant 0.5.
        width: Option<Box<NodeSyntax>>,
    },
    #[serde(rename_all = "camelCase")]
    Envelope {
        name: Option<String>,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
        scale: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    LowPassFilter {
        input: Box<NodeSyntax>,
        cutoff: Box<NodeSyntax>,
        resonance: Box<NodeSyntax>,
    },
    #[serde(rename_all = "camelCase")]
    Choruser {
        name: Option<String>,
        /// Constant name inside `input` that carries the frequency to
        /// detune.
        target: String,
        cents: f64,
        num_voices: usize,
        input: Box<NodeSyntax>,
    },
    Crossfade {
        inputs: Vec<NodeSyntax>,
        mix: Box<NodeSyntax>,
    },
    CrossfadeEqPow {
        inputs: Vec<NodeSyntax>,
        mix: Box<NodeSyntax>,
    },
    #[serde(rename_all = "camelCase")]
    NoiseSmoothStep {
        freq: f64,
        min: f64,
        max: f64,
    },
    Rand {
        min: f64,
        max: f64,
    },
    ExpRand {
        min: f64,
        max: f64,
    },
    Line {
        duration: f64,
        from: f64,
        to: f64,
    },
    Gate {
        input: Box<NodeSyntax>,
    },
    /// Value derived from the chord event bound by the scheduler.
    Event {
        field: EventField,
    },
    /// Reference to an earlier library entry.
    Lib {
        name: String,
    },
}

/// A named reusable sub-tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    pub def: NodeSyntax,
}

/// A complete instrument description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSyntax {
    pub name: Option<String>,
    #[serde(default)]
    pub library: Vec<LibraryEntry>,
    pub root: NodeSyntax,
}

impl PresetSyntax {
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        serde_json::from_str(json).map_err(|e| crate::Error::SpecInvalid {
            at: format!("line {}, column {}", e.line(), e.column()),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_key_objects() {
        let json = r#"
        {
            "name": "pluck",
            "root": {
                "compose": [
                    { "prod": [ { "const": { "name": "freq", "value": 440.0 } }, "identity" ] },
                    { "osc": { "name": "osc1", "shape": "sine" } }
                ]
            }
        }"#;
        let preset = PresetSyntax::from_json(json).unwrap();
        assert_eq!(preset.name.as_deref(), Some("pluck"));
        match &preset.root {
            NodeSyntax::Compose(stages) => assert_eq!(stages.len(), 2),
            other => panic!("expected compose, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_envelope_and_library() {
        let json = r#"
        {
            "name": "pad",
            "library": [
                { "name": "amp", "def": { "envelope": { "name": "ampEnv", "attack": 0.01, "decay": 0.1, "sustain": 0.6, "release": 0.4 } } }
            ],
            "root": { "prod": [ { "lib": { "name": "amp" } }, "identity" ] }
        }"#;
        let preset = PresetSyntax::from_json(json).unwrap();
        assert_eq!(preset.library.len(), 1);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let json = r#"{ "root": { "warble": { "x": 1 } } }"#;
        let err = PresetSyntax::from_json(json).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("warble") || msg.contains("unknown variant"), "{msg}");
    }

    #[test]
    fn test_roundtrip_is_single_key() {
        let node = NodeSyntax::Sum(vec![
            NodeSyntax::Identity,
            NodeSyntax::Const {
                name: Some("x".into()),
                value: 2.0,
            },
        ]);
        let json = serde_json::to_value(&node).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("sum"));
    }
}
