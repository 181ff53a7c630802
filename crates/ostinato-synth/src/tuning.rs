//! Equal-tempered tuning.

/// MIDI note → frequency conversion with a configurable A4 reference.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub a4_hz: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self { a4_hz: 440.0 }
    }
}

impl Tuning {
    pub fn concert() -> Self {
        Self::default()
    }

    /// Frequency of a MIDI note in twelve-tone equal temperament.
    #[inline]
    pub fn midi_to_hz(&self, note: u8) -> f64 {
        self.a4_hz * ((note as f64 - 69.0) / 12.0).exp2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_pitches() {
        let t = Tuning::default();
        assert!((t.midi_to_hz(69) - 440.0).abs() < 1e-9);
        assert!((t.midi_to_hz(60) - 261.6256).abs() < 1e-3);
        assert!((t.midi_to_hz(81) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn test_baroque_reference() {
        let t = Tuning { a4_hz: 415.0 };
        assert!((t.midi_to_hz(69) - 415.0).abs() < 1e-9);
    }
}
