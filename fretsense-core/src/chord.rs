//! # Chord Identification Module
//!
//! Two independent strategies, merged by the per-frame pipeline:
//!
//! 1. **Blind template matching**: the chroma vector is scored against
//!    major and minor triad templates for all 12 roots. Templates are
//!    ordered root 0..11, major before minor, and comparisons are strictly
//!    greater-than, so earlier templates win exact ties (an open-string
//!    chroma resolves to Em, not G).
//! 2. **Expected-chord validation**: when the caller supplies the chord
//!    the learner is supposed to play, per-string correctness, clarity, and
//!    amplitude blend into a quality score that confirms (or fails to
//!    confirm) it.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chroma::ChromaVector;
use crate::strings::StringAnalysis;
use crate::tuning::NOTE_NAMES;

/// Triad quality. Only major and minor are matched blindly; richer chords
/// are the expected-chord path's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
}

/// A chord label: root pitch class (0 = C .. 11 = B) plus quality.
/// Displays as "C", "Am", "F#m", and parses the same spellings (flats are
/// folded to their sharp equivalents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chord {
    pub root: u8,
    pub quality: ChordQuality,
}

impl Chord {
    pub fn new(root: u8, quality: ChordQuality) -> Self {
        Self { root: root % 12, quality }
    }

    /// The three pitch classes of this chord's triad.
    pub fn pitch_classes(&self) -> [usize; 3] {
        let root = self.root as usize;
        let third = match self.quality {
            ChordQuality::Major => 4,
            ChordQuality::Minor => 3,
        };
        [root, (root + third) % 12, (root + 7) % 12]
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", NOTE_NAMES[self.root as usize % 12])?;
        if self.quality == ChordQuality::Minor {
            write!(f, "m")?;
        }
        Ok(())
    }
}

/// Failure to parse a chord label.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unrecognized chord label: {0:?}")]
pub struct ChordParseError(pub String);

impl FromStr for Chord {
    type Err = ChordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars.next().ok_or_else(|| ChordParseError(s.into()))?;
        let natural = match letter.to_ascii_uppercase() {
            'C' => 0i8,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(ChordParseError(s.into())),
        };

        let rest: String = chars.collect();
        let (accidental, rest) = match rest.chars().next() {
            Some('#') => (1i8, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest.as_str()),
        };

        let quality = match rest {
            "" => ChordQuality::Major,
            "m" | "min" => ChordQuality::Minor,
            "maj" | "M" => ChordQuality::Major,
            _ => return Err(ChordParseError(s.into())),
        };

        Ok(Chord::new((natural + accidental).rem_euclid(12) as u8, quality))
    }
}

/// A single strategy's best guess with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordGuess {
    pub chord: Chord,
    pub confidence: f32,
}

/// Frame-level quality summary produced by expected-chord validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityReport {
    /// Blend of clarity, note accuracy, and amplitude, 0..1.
    pub overall: f32,
    /// Fraction of strings that rang correctly.
    pub note_accuracy: f32,
    /// Mean clarity over all strings.
    pub clarity: f32,
    /// Mean amplitude, standing in for sustain.
    pub sustain: f32,
}

/// Validation outcome for the expected chord (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct ChordValidation {
    /// The expected chord, confirmed only when confidence cleared the bar.
    pub chord: Option<Chord>,
    pub confidence: f32,
    pub quality: QualityReport,
}

/// Number of notes per triad template, used to normalize the dot product.
const TEMPLATE_NOTE_COUNT: f32 = 3.0;

/// The 24 triad templates: for each root 0..11, a major then a minor
/// indicator vector. Order matters: ties resolve to the earlier entry.
static TEMPLATES: Lazy<Vec<(Chord, [f32; 12])>> = Lazy::new(|| {
    let mut templates = Vec::with_capacity(24);
    for root in 0..12u8 {
        for quality in [ChordQuality::Major, ChordQuality::Minor] {
            let chord = Chord::new(root, quality);
            let mut template = [0.0f32; 12];
            for pc in chord.pitch_classes() {
                template[pc] = 1.0;
            }
            templates.push((chord, template));
        }
    }
    templates
});

/// Blind chord identification from a chroma vector.
///
/// Score is the chroma/template dot product normalized by the triad note
/// count. Only a score strictly above `min_score` yields a guess.
pub fn match_templates(chroma: &ChromaVector, min_score: f32) -> Option<ChordGuess> {
    let mut best: Option<ChordGuess> = None;
    let mut best_score = min_score;

    for (chord, template) in TEMPLATES.iter() {
        let score: f32 = chroma
            .0
            .iter()
            .zip(template.iter())
            .map(|(c, t)| c * t)
            .sum::<f32>()
            / TEMPLATE_NOTE_COUNT;

        if score > best_score {
            best_score = score;
            best = Some(ChordGuess { chord: *chord, confidence: score });
        }
    }

    best
}

/// Validates an expected chord against the per-string analyses.
///
/// The quality blend is computed regardless of whether an expected chord
/// was supplied; the chord is confirmed only when one was and the derived
/// confidence exceeds `min_confidence`.
pub fn validate_expected(
    strings: &[StringAnalysis],
    expected: Option<Chord>,
    min_amplitude: f32,
    min_confidence: f32,
) -> ChordValidation {
    let total = strings.len();
    if total == 0 {
        return ChordValidation {
            chord: None,
            confidence: 0.0,
            quality: QualityReport::default(),
        };
    }

    let played = strings
        .iter()
        .filter(|s| s.is_correct && s.amplitude > min_amplitude)
        .count();

    let avg_clarity = strings.iter().map(|s| s.clarity).sum::<f32>() / total as f32;
    let avg_amplitude = strings.iter().map(|s| s.amplitude).sum::<f32>() / total as f32;
    let correct_ratio = played as f32 / total as f32;

    let quality = QualityReport {
        overall: (avg_clarity + correct_ratio + (avg_amplitude * 10.0).min(1.0)) / 3.0,
        note_accuracy: correct_ratio,
        clarity: avg_clarity,
        sustain: avg_amplitude,
    };

    let confidence = (quality.overall * 1.2).min(1.0);

    ChordValidation {
        chord: expected.filter(|_| confidence > min_confidence),
        confidence,
        quality,
    }
}
