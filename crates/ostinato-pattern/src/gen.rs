//! Note generators: musical material tables and chord builders.

use serde::{Deserialize, Serialize};

/// Scale interval tables (semitones above the root, one octave).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scale {
    Major,
    Minor,
    HarmonicMinor,
    Dorian,
    Mixolydian,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Chromatic,
}

impl Scale {
    pub fn intervals(self) -> &'static [i32] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn degree_count(self) -> usize {
        self.intervals().len()
    }

    /// MIDI note for a scale degree relative to `root`. Degrees outside
    /// one octave wrap with an octave shift, negative degrees included.
    pub fn degree_to_midi(self, root: i32, degree: i32) -> i32 {
        let n = self.degree_count() as i32;
        let octave = degree.div_euclid(n);
        let step = degree.rem_euclid(n) as usize;
        root + octave * 12 + self.intervals()[step]
    }
}

/// Diatonic progression walked by a chord-progression generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressionStyle {
    /// I - IV - V - I
    Basic,
    /// I - V - vi - IV
    Pop,
    /// ii - V - I
    Cadence,
}

impl Default for ProgressionStyle {
    fn default() -> Self {
        ProgressionStyle::Basic
    }
}

impl ProgressionStyle {
    /// Scale degrees of the progression's chord roots.
    pub fn degrees(self) -> &'static [i32] {
        match self {
            ProgressionStyle::Basic => &[0, 3, 4, 0],
            ProgressionStyle::Pop => &[0, 4, 5, 3],
            ProgressionStyle::Cadence => &[1, 4, 0],
        }
    }
}

/// Build a diatonic triad on a scale degree by stacking thirds.
pub fn triad(scale: Scale, root: i32, degree: i32) -> Vec<i32> {
    (0..3)
        .map(|third| scale.degree_to_midi(root, degree + third * 2))
        .collect()
}

/// Clamp to the playable MIDI range, dropping what falls outside.
pub fn clamp_midi(notes: impl IntoIterator<Item = i32>) -> Vec<u8> {
    notes
        .into_iter()
        .filter(|&n| (0..=127).contains(&n))
        .map(|n| n as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_scale_degrees() {
        // C4 major
        assert_eq!(Scale::Major.degree_to_midi(60, 0), 60);
        assert_eq!(Scale::Major.degree_to_midi(60, 2), 64);
        assert_eq!(Scale::Major.degree_to_midi(60, 7), 72, "octave wrap");
        assert_eq!(Scale::Major.degree_to_midi(60, -1), 59, "leading tone below");
    }

    #[test]
    fn test_triads() {
        // C major triad on I
        assert_eq!(triad(Scale::Major, 60, 0), vec![60, 64, 67]);
        // A minor triad on vi
        assert_eq!(triad(Scale::Major, 60, 5), vec![69, 72, 76]);
    }

    #[test]
    fn test_progression_degrees() {
        assert_eq!(ProgressionStyle::Pop.degrees(), &[0, 4, 5, 3]);
    }

    #[test]
    fn test_clamp_midi_drops_out_of_range() {
        assert_eq!(clamp_midi(vec![-3, 60, 130]), vec![60]);
    }
}
