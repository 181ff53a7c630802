//! Pattern scheduling for ostinato.
//!
//! A [`Pattern`] walks three iterators - chords, sustains, gaps - and
//! drives a preset against an injected [`Clock`]. Tests run whole patterns
//! in zero wall-clock time with [`ImmediateClock`]; offline rendering uses
//! [`OfflineClock`], advanced once per rendered block; live playback uses
//! [`SystemClock`].

pub mod error;
pub use error::{Error, Result};

pub mod clock;
pub mod event;
pub mod gen;
pub mod iter;
pub mod sched;
pub mod syntax;

pub use clock::{Clock, ImmediateClock, OfflineClock, PlayControl, SystemClock, Wake};
pub use event::ChordEvent;
pub use gen::{ProgressionStyle, Scale};
pub use sched::{Pattern, PatternHandle, PlayOutcome};
pub use syntax::{
    DurationSyntax, FixedEventSyntax, IteratedList, IteratorSyntax, ModulatorSyntax,
    NoteGeneratorSyntax, NoteSyntax, PatternSyntax,
};
