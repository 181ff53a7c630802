//! # Ostinato - declarative polyphonic synthesis engine
//!
//! A musical pattern (a timed sequence of chord events) and one or more
//! instrument presets (trees of oscillators, envelopes, filters and
//! combinators) compile into a live signal graph with a polyphonic voice
//! pool per preset. Schedulers walk the pattern against an injected clock
//! and drive the voices; the render driver pulls sample blocks for the
//! audio host or an offline file.
//!
//! ## Architecture
//!
//! Ostinato is an umbrella crate that coordinates:
//! - **ostinato-graph** - signal-graph runtime (nodes, ADSR, compiler,
//!   named handles)
//! - **ostinato-synth** - polyphonic voice banks (ledger, preset assembly,
//!   tuning)
//! - **ostinato-pattern** - chord events, iterator combinators, clocks,
//!   schedulers
//! - **ostinato-render** - block renderer, CPAL live output, offline WAV
//!
//! ## Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let mut engine = Engine::builder()
//!     .sample_rate(44100.0)
//!     .seed(7)
//!     .build()?;
//!
//! engine.load_preset_json("pluck", &preset_json)?;
//! engine.load_pattern_json(&pattern_json)?;
//!
//! // Speakers (Ctrl-C fades out), or:
//! engine.render_offline(Path::new("out.wav"), 10.0)?;
//! ```

/// Re-export of the subsystem crates for direct access.
pub use ostinato_graph as graph;
pub use ostinato_pattern as pattern;
pub use ostinato_render as render;
pub use ostinato_synth as synth;

// Graph runtime
pub use ostinato_graph::{
    compile_node, compile_preset, Adsr, AdsrUpdate, ChorusCell, Compiled, ConstCell, EventField,
    EventSnapshot, GateCell, Handles, Node, NodeSyntax, OscShape, ParamDescriptor, ParamKind,
    PresetSyntax, Stage, MAX_BLOCK,
};

// Voices
pub use ostinato_synth::{Note, Preset, Tuning, VoiceLedger};

// Patterns and clocks
pub use ostinato_pattern::{
    ChordEvent, Clock, ImmediateClock, OfflineClock, Pattern, PatternHandle, PatternSyntax,
    PlayControl, PlayOutcome, Scale, SystemClock, Wake,
};

// Render path
pub use ostinato_render::{render_to_wav, BlockRenderer, LiveOutput, RenderStatus};

mod engine;
pub use engine::{Engine, EngineBuilder, EngineConfig};

pub mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports.
pub mod prelude {
    pub use crate::engine::{Engine, EngineBuilder};
    pub use crate::error::{Error, Result};

    pub use crate::graph::{
        compile_preset, Handles, Node, NodeSyntax, PresetSyntax, MAX_BLOCK,
    };
    pub use crate::pattern::{
        Clock, ImmediateClock, OfflineClock, Pattern, PatternSyntax, PlayControl, SystemClock,
    };
    pub use crate::render::{BlockRenderer, LiveOutput, RenderStatus};
    pub use crate::synth::{Note, Preset, Tuning};
}
