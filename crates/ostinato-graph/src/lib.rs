//! Signal-graph runtime: block-processing nodes, the ADSR machine, the
//! declarative-spec compiler and the named handle index.
//!
//! ```ignore
//! let spec = PresetSyntax::from_json(&json)?;
//! let mut compiled = compile_preset(&spec, seed)?;
//! compiled.root.set_sample_rate(44_100.0);
//! compiled.handles.set_const("freq", 440.0);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod adsr;
pub mod compile;
pub mod handles;
pub mod kernel;
pub mod node;
pub mod params;
pub mod syntax;

pub use adsr::{Adsr, AdsrParams, AdsrUpdate, FinishFn, Stage, StartFn};
pub use compile::{compile_node, compile_preset, Compiled};
pub use handles::{Handles, ParamDescriptor, ParamKind};
pub use node::{Node, MAX_BLOCK};
pub use params::{
    AtomicFlag, AtomicSample, ChorusCell, ConstCell, ConstShape, EventCell, EventField,
    EventSnapshot, GateCell, OscCell, OscShape, GATE_CLOSE_DELAY,
};
pub use syntax::{LibraryEntry, NodeSyntax, PresetSyntax};
