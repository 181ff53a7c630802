//! Chord events.

use ostinato_graph::EventSnapshot;
use ostinato_synth::{Note, Tuning};

/// One step of a pattern: a chord held for `sustain` seconds followed by
/// `gap` seconds of silence. Transient - lives only while its play step is
/// in flight.
#[derive(Debug, Clone)]
pub struct ChordEvent {
    pub notes: Vec<Note>,
    pub sustain: f64,
    pub gap: f64,
}

impl ChordEvent {
    /// Plain data bound to event-driven graph nodes for this step.
    pub fn snapshot(&self, tuning: Tuning) -> EventSnapshot {
        let velocity = self
            .notes
            .iter()
            .map(|n| n.velocity)
            .fold(0.0f64, f64::max);
        EventSnapshot {
            velocity,
            note_hz: self.notes.iter().map(|n| tuning.midi_to_hz(n.midi)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_fields() {
        let event = ChordEvent {
            notes: vec![Note::new(69, 0.5), Note::new(81, 0.9)],
            sustain: 0.2,
            gap: 0.1,
        };
        let snap = event.snapshot(Tuning::default());
        assert_eq!(snap.note_count(), 2);
        assert!((snap.velocity - 0.9).abs() < 1e-12);
        assert!((snap.lowest_hz() - 440.0).abs() < 1e-6);
        assert!((snap.highest_hz() - 880.0).abs() < 1e-6);
    }
}
