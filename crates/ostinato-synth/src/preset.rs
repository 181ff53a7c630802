//! Polyphonic preset: a bank of independently compiled voices behind a
//! summing gate.
//!
//! `build` compiles the instrument spec once per voice, so every voice owns
//! its own envelopes, frequency constants and filter state. The voices are
//! summed and wrapped in a gate whose lifecycle follows the amp envelopes:
//! the first note-on opens it, and 50 ms after the last amp envelope closes
//! it shuts again, guaranteeing no residual computation while silent.
//!
//! The returned [`Node`] is the render-side object; the `Preset` itself is
//! the control-side object (note dispatch, handle writes, voice ledger).

use crate::ledger::VoiceLedger;
use crate::tuning::Tuning;
use crate::{Error, Result};
use ostinato_graph::{compile_preset, Adsr, GateCell, Handles, Node, PresetSyntax};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Name of the envelope list that drives gate lifecycle and voice
/// recycling.
pub const AMP_ENV: &str = "ampEnv";

/// Constant names written on every trigger.
const FREQ: &str = "freq";
const VELOCITY: &str = "velocity";

/// A note as dispatched to a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub midi: u8,
    /// Normalized 0.0 - 1.0.
    pub velocity: f64,
}

impl Note {
    pub fn new(midi: u8, velocity: f64) -> Self {
        Self {
            midi,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }
}

/// A voice reserved for an event in flight: the pitch and velocity are
/// already written, the envelopes not yet started.
#[derive(Debug, Clone, Copy)]
pub struct ClaimedVoice {
    slot: usize,
}

struct Voice {
    handles: Handles,
    amp_envs: Vec<Arc<Adsr>>,
    all_envs: Vec<Arc<Adsr>>,
}

pub struct Preset {
    name: String,
    voices: Vec<Voice>,
    handles: Handles,
    gate: Arc<GateCell>,
    ledger: VoiceLedger,
    active_notes: Arc<AtomicUsize>,
    tuning: Tuning,
}

impl std::fmt::Debug for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preset")
            .field("name", &self.name)
            .field("voices", &self.voices.len())
            .finish_non_exhaustive()
    }
}

impl Preset {
    /// Compile `num_voices` copies of `spec` and assemble the playable
    /// bank. Returns the control object and the render root (the gated sum
    /// of all voices), with the sample rate already propagated.
    pub fn build(
        name: impl Into<String>,
        spec: &PresetSyntax,
        num_voices: usize,
        sample_rate: f64,
        seed: u64,
    ) -> Result<(Preset, Node)> {
        if num_voices == 0 {
            return Err(Error::InvalidVoiceCount);
        }
        let name = name.into();

        let mut roots = Vec::with_capacity(num_voices);
        let mut voices = Vec::with_capacity(num_voices);
        let mut merged = Handles::new();
        for i in 0..num_voices {
            let compiled = compile_preset(spec, seed.wrapping_add(i as u64))?;
            let amp_envs = compiled.handles.adsrs_named(AMP_ENV).to_vec();
            let all_envs: Vec<Arc<Adsr>> = compiled
                .handles
                .adsrs
                .values()
                .flatten()
                .cloned()
                .collect();
            let voice = Voice {
                amp_envs,
                all_envs,
                handles: clone_handles(&compiled.handles),
            };
            merged.merge(compiled.handles);
            roots.push(compiled.root);
            voices.push(voice);
        }

        let gate = Arc::new(GateCell::new());
        let mut root = Node::gate(Node::sum(roots), gate.clone());
        root.set_sample_rate(sample_rate);

        let ledger = VoiceLedger::new(num_voices);
        let preset = Preset {
            name,
            voices,
            handles: merged,
            gate,
            ledger,
            active_notes: Arc::new(AtomicUsize::new(0)),
            tuning: Tuning::default(),
        };
        preset.wire_lifecycle();
        Ok((preset, root))
    }

    /// Register gate-open on every amp envelope's start and voice recycling
    /// plus delayed gate-close on its finish. The all-closed probe holds
    /// weak references so the envelopes' own callback lists cannot keep
    /// them alive.
    fn wire_lifecycle(&self) {
        let all_amps: Arc<Vec<Weak<Adsr>>> = Arc::new(
            self.voices
                .iter()
                .flat_map(|v| v.amp_envs.iter().map(Arc::downgrade))
                .collect(),
        );

        for (slot, voice) in self.voices.iter().enumerate() {
            for env in &voice.amp_envs {
                let gate = self.gate.clone();
                env.on_start(Arc::new(move || {
                    gate.cancel_close();
                    gate.set_open(true);
                }));

                let gate = self.gate.clone();
                let done = self.ledger.completion_sender();
                let amps = all_amps.clone();
                env.on_finish(Arc::new(move |t| {
                    let _ = done.try_send(slot);
                    let all_closed = amps
                        .iter()
                        .all(|w| w.upgrade().map_or(true, |e| e.is_closed()));
                    if all_closed {
                        gate.request_close(t);
                    }
                }));
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merged handle index across every voice.
    pub fn handles(&self) -> &Handles {
        &self.handles
    }

    pub fn gate(&self) -> Arc<GateCell> {
        self.gate.clone()
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn set_tuning(&mut self, tuning: Tuning) {
        self.tuning = tuning;
    }

    /// Notes currently sounding (not yet released).
    pub fn active_note_count(&self) -> usize {
        self.active_notes.load(Ordering::Relaxed)
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    /// Reserve a voice for `note` and write its frequency and velocity
    /// into that voice's named constants. The envelopes are not started
    /// yet: per-event modulators run between this step and
    /// [`Preset::start_voice`], so a modulator may override any named
    /// constant, "freq" included. At exhaustion the note is dropped and
    /// `None` returned.
    ///
    /// A note that is already mapped retriggers its voice in place. The
    /// counter tracks sounding notes: a retrigger of a still-playing note
    /// leaves it unchanged, while reviving a releasing note counts again
    /// (its note-off already decremented).
    pub fn claim_note(&mut self, note: Note) -> Option<ClaimedVoice> {
        self.ledger.drain_completed();
        let was_playing = self
            .ledger
            .voice_index(note.midi)
            .is_some_and(|slot| !self.ledger.is_releasing(slot));

        match self.ledger.take_available(note.midi) {
            Some(slot) => {
                if !was_playing {
                    self.active_notes.fetch_add(1, Ordering::Relaxed);
                }
                let hz = self.tuning.midi_to_hz(note.midi);
                let voice = &self.voices[slot];
                voice.handles.set_const(FREQ, hz);
                voice.handles.set_const(VELOCITY, note.velocity);
                Some(ClaimedVoice { slot })
            }
            None => {
                log::debug!(
                    "preset '{}': voice pool exhausted, dropping note {}",
                    self.name,
                    note.midi
                );
                None
            }
        }
    }

    /// Start a claimed voice's envelopes.
    pub fn start_voice(&self, claimed: ClaimedVoice) {
        for env in &self.voices[claimed.slot].all_envs {
            env.note_on();
        }
    }

    /// Dispatch a note-on: claim a voice and start it immediately.
    pub fn note_on(&mut self, note: Note) {
        if let Some(claimed) = self.claim_note(note) {
            self.start_voice(claimed);
        }
    }

    /// Dispatch a note-off. Duplicate note-offs for a releasing note are
    /// blocked by the ledger.
    pub fn note_off(&mut self, midi: u8) {
        if let Some(slot) = self.ledger.begin_release(midi) {
            self.active_notes.fetch_sub(1, Ordering::Relaxed);
            let voice = &self.voices[slot];
            for env in &voice.all_envs {
                env.note_off();
            }
            if voice.amp_envs.is_empty() {
                // Nothing will report completion; recycle immediately.
                self.ledger.release_complete(slot);
            }
        }
    }

    /// Note-off for everything currently mapped. Used by scheduler
    /// teardown so cancellation never strands a sounding note.
    pub fn release_all(&mut self) {
        for midi in self.ledger.mapped_notes() {
            self.note_off(midi);
        }
    }

    /// Stage of the first amp envelope of `slot`, for diagnostics.
    pub fn amp_stage(&self, slot: usize) -> Option<ostinato_graph::Stage> {
        self.voices
            .get(slot)?
            .amp_envs
            .first()
            .map(|e| e.stage())
    }

    #[doc(hidden)]
    pub fn ledger_mut(&mut self) -> &mut VoiceLedger {
        &mut self.ledger
    }
}

/// Shallow-clone a handle index: same cells, fresh maps.
fn clone_handles(handles: &Handles) -> Handles {
    let mut out = Handles::new();
    for (name, cells) in &handles.consts {
        for cell in cells {
            out.add_const(name, cell.clone());
        }
    }
    for (name, envs) in &handles.adsrs {
        for env in envs {
            out.add_adsr(name, env.clone());
        }
    }
    for (name, cells) in &handles.oscs {
        out.oscs
            .entry(name.clone())
            .or_default()
            .extend(cells.iter().cloned());
    }
    for (name, cells) in &handles.basic_oscs {
        for cell in cells {
            out.add_basic_osc(name, cell.clone());
        }
    }
    for (name, cells) in &handles.chorusers {
        for cell in cells {
            out.add_choruser(name, cell.clone());
        }
    }
    for cell in &handles.events {
        out.add_event(cell.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_graph::Stage;

    const RATE: f64 = 44_100.0;

    fn pluck_spec() -> PresetSyntax {
        let json = r#"
        {
            "name": "pluck",
            "root": {
                "prod": [
                    { "envelope": { "name": "ampEnv", "attack": 0.01, "decay": 0.05, "sustain": 0.7, "release": 0.1 } },
                    {
                        "compose": [
                            { "prod": [ { "const": { "name": "freq", "value": 220.0 } }, "identity" ] },
                            { "osc": { "name": "osc1", "shape": "sine" } }
                        ]
                    }
                ]
            }
        }"#;
        PresetSyntax::from_json(json).unwrap()
    }

    fn drive(root: &mut Node, from: f64, seconds: f64) {
        let frames = (seconds * RATE) as u64;
        let first = (from * RATE) as u64;
        let mut out = vec![0.0; 512];
        let mut i = 0u64;
        while i < frames {
            let n = 512.min(frames - i) as usize;
            let input: Vec<f64> = (0..n).map(|k| (first + i + k as u64) as f64 / RATE).collect();
            root.process(&input, &mut out[..n]);
            i += n as u64;
        }
    }

    #[test]
    fn test_build_merges_voice_handles() {
        let (preset, _root) = Preset::build("pluck", &pluck_spec(), 4, RATE, 1).unwrap();
        assert_eq!(preset.handles().consts["freq"].len(), 4);
        assert_eq!(preset.handles().adsrs["ampEnv"].len(), 4);
        assert_eq!(preset.num_voices(), 4);
    }

    #[test]
    fn test_note_on_opens_gate_and_writes_freq() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();
        assert!(!preset.gate().is_open(), "gate starts closed");

        preset.note_on(Note::new(69, 0.9));
        assert!(preset.gate().is_open());
        assert_eq!(preset.active_note_count(), 1);

        // Slot 0's freq cell got A4; slot 1 keeps its compiled default.
        let cells = &preset.handles().consts["freq"];
        assert!((cells[0].value() - 440.0).abs() < 1e-9);
        assert!((cells[1].value() - 220.0).abs() < 1e-9);
        assert_eq!(preset.amp_stage(0), Some(Stage::Attack));
    }

    #[test]
    fn test_retrigger_keeps_active_count() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();
        preset.note_on(Note::new(60, 0.8));
        preset.note_on(Note::new(60, 0.8));
        assert_eq!(preset.active_note_count(), 1);
    }

    #[test]
    fn test_reviving_releasing_note_counts_again() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();
        preset.note_on(Note::new(60, 0.8));
        assert_eq!(preset.active_note_count(), 1);
        preset.note_off(60);
        assert_eq!(preset.active_note_count(), 0);

        // The release tail is still sounding; bringing the note back makes
        // it active again and the later note_off balances it.
        preset.note_on(Note::new(60, 0.8));
        assert_eq!(preset.active_note_count(), 1);
        assert_eq!(preset.amp_stage(0), Some(Stage::Attack));
        preset.note_off(60);
        assert_eq!(preset.active_note_count(), 0);
    }

    #[test]
    fn test_exhaustion_drops_note() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();
        preset.note_on(Note::new(60, 0.8));
        preset.note_on(Note::new(62, 0.8));
        preset.note_on(Note::new(64, 0.8));
        assert_eq!(preset.active_note_count(), 2);
    }

    #[test]
    fn test_full_cycle_recycles_slots_and_closes_gate() {
        let (mut preset, mut root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();

        preset.note_on(Note::new(60, 0.8));
        preset.note_on(Note::new(64, 0.8));
        drive(&mut root, 0.0, 0.1);

        preset.note_off(60);
        preset.note_off(64);
        assert_eq!(preset.active_note_count(), 0);
        assert_eq!(preset.amp_stage(0), Some(Stage::Release));

        // Render past the release tail: envelopes close, completions land.
        drive(&mut root, 0.1, 0.3);
        assert_eq!(preset.amp_stage(0), Some(Stage::Closed));

        preset.ledger_mut().drain_completed();
        assert_eq!(preset.ledger_mut().free_count(), 2);

        // The delayed close has been requested; applying it past the
        // deadline shuts the gate.
        preset.gate().maybe_close(1.0);
        assert!(!preset.gate().is_open());
    }

    #[test]
    fn test_note_off_unknown_note_is_noop() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 2, RATE, 1).unwrap();
        preset.note_off(99);
        assert_eq!(preset.active_note_count(), 0);
    }

    #[test]
    fn test_release_all() {
        let (mut preset, _root) = Preset::build("pluck", &pluck_spec(), 4, RATE, 1).unwrap();
        preset.note_on(Note::new(60, 0.8));
        preset.note_on(Note::new(64, 0.8));
        preset.note_on(Note::new(67, 0.8));
        preset.release_all();
        assert_eq!(preset.active_note_count(), 0);
        assert_eq!(preset.amp_stage(0), Some(Stage::Release));
    }
}
