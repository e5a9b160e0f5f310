//! # Musical Tuning Module
//!
//! Note naming, pitch-class mapping, and cent math for the detection engine,
//! based on equal temperament with A4 = 440 Hz, plus the data-driven
//! instrument profiles (string count + open-string reference frequencies)
//! that the rest of the pipeline consumes.
//!
//! ## Features
//! - Frequency to note-name conversion (e.g. 82.41 Hz -> "E2")
//! - Frequency to pitch-class (0 = C .. 11 = B) for chroma folding
//! - Cent deviation calculations for tuning accuracy
//! - Guitar and bass profiles; new instruments are data, not code paths

use serde::{Deserialize, Serialize};

/// Chromatic note names starting at C, matching the pitch-class convention
/// used by the chroma extractor and chord templates (0 = C).
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Concert pitch reference.
pub const A4_HZ: f32 = 440.0;

/// `2^(1/12) - 1`: the fractional frequency spread of one semitone.
/// Used to size the per-string fundamental search window in bins.
pub const SEMITONE_SPREAD: f32 = 0.059_463_1;

/// Converts a frequency to its nearest note name with octave (e.g. "E2").
///
/// Returns `None` for non-positive or non-finite input.
pub fn note_name(frequency: f32) -> Option<String> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    // Semitones relative to A4, then re-anchored so 0 lands on C4.
    let semitones = (12.0 * (frequency / A4_HZ).log2()).round() as i32 + 9;
    let octave = semitones.div_euclid(12) + 4;
    let index = semitones.rem_euclid(12) as usize;
    Some(format!("{}{}", NOTE_NAMES[index], octave))
}

/// Maps a frequency to its pitch class (0 = C .. 11 = B), octave-independent.
pub fn pitch_class(frequency: f32) -> Option<usize> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }
    // MIDI note number; A4 = 69, and 69 % 12 == 9 == A with 0 == C.
    let midi = (12.0 * (frequency / A4_HZ).log2()).round() as i32 + 69;
    Some(midi.rem_euclid(12) as usize)
}

/// Calculates the deviation of `frequency` from `target` in cents.
///
/// 100 cents = 1 semitone; positive = sharp, negative = flat.
/// Degenerate inputs yield 0 so a dead bin never classifies as out of tune.
pub fn cents_off(frequency: f32, target: f32) -> f32 {
    if frequency <= 0.0 || target <= 0.0 {
        return 0.0;
    }
    1200.0 * (frequency / target).log2()
}

/// Open-string layout of the instrument being analyzed.
///
/// Strings are numbered 1..=N from the lowest-pitched string, matching the
/// numbering in [`crate::strings::StringAnalysis`]. Adding an instrument
/// means constructing a new profile, not adding a code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    /// Display name, e.g. "guitar".
    pub name: String,
    /// Open-string reference frequencies in Hz, low to high.
    pub open_strings: Vec<f32>,
}

impl InstrumentProfile {
    /// Standard-tuned 6-string guitar (E2 A2 D3 G3 B3 E4).
    pub fn guitar() -> Self {
        Self {
            name: "guitar".into(),
            open_strings: vec![82.41, 110.00, 146.83, 196.00, 246.94, 329.63],
        }
    }

    /// Standard-tuned 4-string bass (E1 A1 D2 G2).
    pub fn bass() -> Self {
        Self {
            name: "bass".into(),
            open_strings: vec![41.20, 55.00, 73.42, 98.00],
        }
    }

    /// Number of strings in this profile.
    pub fn string_count(&self) -> usize {
        self.open_strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_open_guitar_strings() {
        assert_eq!(note_name(82.41).as_deref(), Some("E2"));
        assert_eq!(note_name(110.0).as_deref(), Some("A2"));
        assert_eq!(note_name(146.83).as_deref(), Some("D3"));
        assert_eq!(note_name(196.0).as_deref(), Some("G3"));
        assert_eq!(note_name(246.94).as_deref(), Some("B3"));
        assert_eq!(note_name(329.63).as_deref(), Some("E4"));
    }

    #[test]
    fn names_reference_pitch() {
        assert_eq!(note_name(440.0).as_deref(), Some("A4"));
        assert_eq!(note_name(261.63).as_deref(), Some("C4"));
    }

    #[test]
    fn pitch_classes_fold_octaves() {
        // E2 and E4 land in the same bin.
        assert_eq!(pitch_class(82.41), pitch_class(329.63));
        assert_eq!(pitch_class(440.0), Some(9)); // A
        assert_eq!(pitch_class(261.63), Some(0)); // C
    }

    #[test]
    fn cents_math() {
        assert!(cents_off(440.0, 440.0).abs() < 1e-3);
        // One semitone sharp is +100 cents.
        assert!((cents_off(466.16, 440.0) - 100.0).abs() < 0.5);
        assert_eq!(cents_off(0.0, 440.0), 0.0);
    }

    #[test]
    fn profiles_are_data() {
        assert_eq!(InstrumentProfile::guitar().string_count(), 6);
        assert_eq!(InstrumentProfile::bass().string_count(), 4);
    }
}
