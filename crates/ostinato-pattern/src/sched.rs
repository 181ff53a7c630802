//! The pattern scheduler.
//!
//! One cooperative task per pattern walks three iterators - chords,
//! sustains, gaps - and drives its preset: bind the event, evaluate
//! modulators once, note-on the chord, sleep the sustain, note-off, sleep
//! the gap. All suspension happens inside the injected clock, which is
//! where pause and cancellation are observed; a cancelled sleep always
//! issues the outstanding note-offs before the task returns.

use crate::clock::{Clock, PlayControl, Wake};
use crate::event::ChordEvent;
use crate::gen::{clamp_midi, triad, Scale};
use crate::iter::{Cyclic, FloatDist, FloatSampler, RandomPick, Shuffled, Waiting};
use crate::syntax::{
    DurationSyntax, IteratedList, IteratorSyntax, NoteGeneratorSyntax, PatternSyntax,
};
use crate::Result;
use ostinato_graph::{compile_node, EventCell, Node};
use ostinato_synth::{Note, Preset};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

const DEFAULT_SUSTAIN: f64 = 0.5;
const DEFAULT_GAP: f64 = 0.0;
const DEFAULT_VELOCITY: f64 = 0.8;

/// How a pattern task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Every event was played.
    Completed,
    /// Cancelled; outstanding note-offs were issued.
    Cancelled,
}

/// A per-event parameter write program.
struct Modulator {
    target: String,
    node: Node,
    event_cells: Vec<Arc<EventCell>>,
}

/// A playable pattern: lazy event stream plus modulator table.
pub struct Pattern {
    name: String,
    notes: Box<dyn Iterator<Item = Vec<Note>> + Send>,
    sustains: Box<dyn Iterator<Item = f64> + Send>,
    gaps: Box<dyn Iterator<Item = f64> + Send>,
    modulators: Vec<Modulator>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("modulators", &self.modulators.len())
            .finish_non_exhaustive()
    }
}

impl Pattern {
    /// Build the iterators and modulator programs described by `syntax`.
    /// `clock` feeds `waiting` orderings; `seed` makes all randomness
    /// reproducible.
    pub fn from_syntax(
        syntax: &PatternSyntax,
        seed: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Pattern> {
        let notes = build_note_iter(&syntax.note_generator, seed, &clock);
        let sustains = build_duration_iter(syntax.sustain.as_ref(), DEFAULT_SUSTAIN, seed ^ 0x51);
        let gaps = build_duration_iter(syntax.gap.as_ref(), DEFAULT_GAP, seed ^ 0x9a);

        let mut modulators = Vec::with_capacity(syntax.modulators.len());
        for (i, m) in syntax.modulators.iter().enumerate() {
            let compiled = compile_node(&m.arrow, seed.wrapping_add(modulator_seed(i)))?;
            modulators.push(Modulator {
                target: m.target.clone(),
                event_cells: compiled.handles.events.clone(),
                node: compiled.root,
            });
        }

        Ok(Pattern {
            name: syntax.name.clone(),
            notes,
            sustains,
            gaps,
            modulators,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the event loop to completion or cancellation on the current
    /// thread.
    pub fn run(mut self, preset: &Mutex<Preset>, clock: &dyn Clock, ctl: &PlayControl) -> PlayOutcome {
        loop {
            if ctl.is_cancelled() {
                return PlayOutcome::Cancelled;
            }
            let (chord, sustain, gap) =
                match (self.notes.next(), self.sustains.next(), self.gaps.next()) {
                    (Some(c), Some(s), Some(g)) => (c, s, g),
                    _ => return PlayOutcome::Completed,
                };

            let now = clock.now();
            let event = ChordEvent {
                notes: chord.clone(),
                sustain,
                gap,
            };

            {
                let mut preset = preset.lock();
                // Reserve voices and write pitches first; modulators run
                // next and may override any named constant, "freq"
                // included. Envelopes start last.
                let claimed: Vec<_> = chord
                    .iter()
                    .filter_map(|note| preset.claim_note(*note))
                    .collect();

                let snapshot = event.snapshot(preset.tuning());
                for cell in &preset.handles().events {
                    cell.bind(snapshot.clone());
                }
                for modulator in &mut self.modulators {
                    for cell in &modulator.event_cells {
                        cell.bind(snapshot.clone());
                    }
                    let value = modulator.node.eval(now);
                    if !preset.handles().set_const(&modulator.target, value) {
                        log::debug!(
                            "pattern '{}': modulator target '{}' matches no handles",
                            self.name,
                            modulator.target
                        );
                    }
                }
                for claimed in claimed {
                    preset.start_voice(claimed);
                }
            }

            if clock.sleep(sustain, ctl) == Wake::Cancelled {
                self.note_off_chord(preset, &chord);
                return PlayOutcome::Cancelled;
            }

            self.note_off_chord(preset, &chord);

            if clock.sleep(gap, ctl) == Wake::Cancelled {
                return PlayOutcome::Cancelled;
            }
        }
    }

    /// Run on a named thread; the handle controls pause and cancellation.
    pub fn spawn(
        self,
        preset: Arc<Mutex<Preset>>,
        clock: Arc<dyn Clock>,
    ) -> PatternHandle {
        let ctl = Arc::new(PlayControl::new());
        let task_ctl = ctl.clone();
        let name = format!("pattern-{}", self.name);
        let join = std::thread::Builder::new()
            .name(name)
            .spawn(move || self.run(&preset, clock.as_ref(), &task_ctl))
            .expect("failed to spawn pattern thread");
        PatternHandle {
            ctl,
            join: Some(join),
        }
    }

    fn note_off_chord(&self, preset: &Mutex<Preset>, chord: &[Note]) {
        let mut preset = preset.lock();
        for note in chord {
            preset.note_off(note.midi);
        }
    }
}

/// Control handle for a spawned pattern task.
pub struct PatternHandle {
    ctl: Arc<PlayControl>,
    join: Option<JoinHandle<PlayOutcome>>,
}

impl PatternHandle {
    pub fn set_paused(&self, paused: bool) {
        self.ctl.set_paused(paused);
    }

    /// Request cancellation; the task issues outstanding note-offs on its
    /// way out.
    pub fn cancel(&self) {
        self.ctl.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Wait for the task to exit.
    pub fn join(mut self) -> PlayOutcome {
        match self.join.take() {
            Some(join) => join.join().unwrap_or(PlayOutcome::Cancelled),
            None => PlayOutcome::Cancelled,
        }
    }
}

fn build_iter<T: Clone + Send + 'static>(
    values: Vec<T>,
    ordering: &IteratorSyntax,
    seed: u64,
    clock: &Arc<dyn Clock>,
) -> Box<dyn Iterator<Item = T> + Send> {
    match ordering {
        IteratorSyntax::Cyclic => Box::new(Cyclic::new(values)),
        IteratorSyntax::Shuffled => Box::new(Shuffled::new(values, seed)),
        IteratorSyntax::Random => Box::new(RandomPick::new(values, seed)),
        IteratorSyntax::Waiting {
            iterator,
            time_between_changes,
        } => {
            let inner = build_iter(values, iterator, seed, clock);
            Box::new(Waiting::new(inner, *time_between_changes, clock.clone()))
        }
    }
}

fn build_list_iter<T: Clone + Send + 'static>(
    list: &IteratedList<T>,
    fallback: &Option<IteratorSyntax>,
    seed: u64,
    clock: &Arc<dyn Clock>,
) -> Box<dyn Iterator<Item = T> + Send> {
    let ordering = list
        .iterator
        .clone()
        .or_else(|| fallback.clone())
        .unwrap_or_default();
    build_iter(list.values.clone(), &ordering, seed, clock)
}

fn build_duration_iter(
    syntax: Option<&DurationSyntax>,
    default: f64,
    seed: u64,
) -> Box<dyn Iterator<Item = f64> + Send> {
    match syntax {
        None => Box::new(std::iter::repeat(default)),
        Some(DurationSyntax::Fixed(v)) => Box::new(std::iter::repeat(*v)),
        Some(DurationSyntax::Random { min, max }) => {
            Box::new(FloatSampler::new(*min, *max, FloatDist::Uniform, seed))
        }
        Some(DurationSyntax::List(values)) => Box::new(Cyclic::new(values.clone())),
    }
}

fn build_note_iter(
    generator: &NoteGeneratorSyntax,
    seed: u64,
    clock: &Arc<dyn Clock>,
) -> Box<dyn Iterator<Item = Vec<Note>> + Send> {
    match generator {
        NoteGeneratorSyntax::Fixed { events } => {
            let chords: Vec<Vec<Note>> = events
                .iter()
                .map(|e| {
                    e.notes
                        .iter()
                        .map(|n| Note::new(n.midi, n.velocity))
                        .collect()
                })
                .collect();
            Box::new(chords.into_iter())
        }

        NoteGeneratorSyntax::ScaleSampler {
            scale,
            root,
            octaves,
        } => {
            let span = octaves.unwrap_or(1).max(1) as usize;
            let candidates: Vec<Vec<Note>> = (0..span * scale.degree_count())
                .filter_map(|degree| {
                    let midi = scale.degree_to_midi(*root as i32, degree as i32);
                    clamp_midi([midi]).first().copied()
                })
                .map(|midi| vec![Note::new(midi, DEFAULT_VELOCITY)])
                .collect();
            Box::new(RandomPick::new(candidates, seed))
        }

        NoteGeneratorSyntax::ChordProgression { scale, root, style } => {
            let style = (*style).unwrap_or_default();
            let chords: Vec<Vec<Note>> = style
                .degrees()
                .iter()
                .map(|&degree| {
                    clamp_midi(triad(*scale, *root as i32, degree))
                        .into_iter()
                        .map(|midi| Note::new(midi, DEFAULT_VELOCITY))
                        .collect()
                })
                .collect();
            Box::new(Cyclic::new(chords))
        }

        NoteGeneratorSyntax::Melodic {
            scales,
            roots,
            octaves,
            degrees,
            ordering,
        } => {
            let iter = MelodicIter {
                scales: build_list_iter(scales, ordering, seed, clock),
                roots: build_list_iter(roots, ordering, seed ^ 0x11, clock),
                octaves: build_list_iter(octaves, ordering, seed ^ 0x22, clock),
                degrees: build_list_iter(degrees, ordering, seed ^ 0x33, clock),
            };
            Box::new(iter)
        }
    }
}

fn modulator_seed(i: usize) -> u64 {
    0x6d0d ^ (i as u64).wrapping_mul(0x2545_f491_4f6c_dd1d)
}

/// Zips the four melodic streams into single-note chords.
struct MelodicIter {
    scales: Box<dyn Iterator<Item = Scale> + Send>,
    roots: Box<dyn Iterator<Item = i32> + Send>,
    octaves: Box<dyn Iterator<Item = i32> + Send>,
    degrees: Box<dyn Iterator<Item = i32> + Send>,
}

impl Iterator for MelodicIter {
    type Item = Vec<Note>;

    fn next(&mut self) -> Option<Vec<Note>> {
        let scale = self.scales.next()?;
        let root = self.roots.next()?;
        let octave = self.octaves.next()?;
        let degree = self.degrees.next()?;
        let midi = scale.degree_to_midi(root + octave * 12, degree);
        Some(
            clamp_midi([midi])
                .into_iter()
                .map(|m| Note::new(m, DEFAULT_VELOCITY))
                .collect(),
        )
    }
}
