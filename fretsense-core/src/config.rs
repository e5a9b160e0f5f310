//! # Detection Configuration
//!
//! Session-wide configuration: sensitivity, noise floor, amplitude gate,
//! latency budget, adaptive-tolerance flag, user skill level, instrument
//! profile, and the analysis tolerances. Created once at session start,
//! updated atomically via [`ConfigPatch`], visible to the frame loop as a
//! whole-struct snapshot (a frame sees the old or the new config in full,
//! never a partial merge).

use serde::{Deserialize, Serialize};

use crate::tuning::InstrumentProfile;

/// Analysis thresholds, kept as named values rather than magic numbers.
///
/// The defaults come straight from the product's field behavior; whether
/// they were empirically tuned or placeholders is unknown, so they are
/// overridable but never silently changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Clarity below this classifies a played string as muted.
    pub muted_clarity_max: f32,
    /// Absolute cent deviation above this classifies as out of tune.
    pub out_of_tune_cents: f32,
    /// Detected pitch further than this many semitones from the expected
    /// note classifies as a wrong note.
    pub wrong_note_semitones: f32,
    /// Minimum normalized template score for a blind chroma match.
    pub blind_match_min_score: f32,
    /// Minimum confidence for the expected chord to be confirmed, and for a
    /// blind guess to be accepted as the fallback detection.
    pub chord_min_confidence: f32,
    /// Confidence above which a detected chord that differs from the
    /// expected one is surfaced as a wrong-fingering problem.
    pub mismatch_report_confidence: f32,
    /// Amplitude-consistency score below this flags poor sustain.
    pub consistency_min: f32,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            muted_clarity_max: 0.3,
            out_of_tune_cents: 50.0,
            wrong_note_semitones: 2.0,
            blind_match_min_score: 0.5,
            chord_min_confidence: 0.6,
            mismatch_report_confidence: 0.7,
            consistency_min: 0.6,
        }
    }
}

/// Process-wide detection configuration, held by the session for its
/// lifetime and mutable through [`ConfigPatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detection sensitivity, 0..=1.
    pub sensitivity: f32,
    /// Spectral bins more than this many dB below the frame peak are
    /// ignored by the chroma extractor.
    pub noise_floor_db: f32,
    /// Minimum RMS amplitude for a frame to count as "played".
    pub min_amplitude: f32,
    /// Maximum tolerable end-to-end latency in milliseconds; also caps the
    /// frame-loop interval.
    pub max_latency_ms: u64,
    /// Whether tolerances adapt to the user's skill level.
    pub adaptive_tolerance: bool,
    /// User skill level, 1..=10. Drives the suggestion tip bands.
    pub user_level: u8,
    /// String count and open-string reference frequencies.
    pub instrument: InstrumentProfile,
    /// Analysis thresholds.
    pub tolerances: Tolerances,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.7,
            noise_floor_db: -70.0,
            min_amplitude: 0.1,
            max_latency_ms: 100,
            adaptive_tolerance: true,
            user_level: 2,
            instrument: InstrumentProfile::guitar(),
            tolerances: Tolerances::default(),
        }
    }
}

/// Partial configuration update. `None` fields leave the current value
/// untouched; the whole patch is applied under one lock so the frame loop
/// never observes a half-merged config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub sensitivity: Option<f32>,
    pub noise_floor_db: Option<f32>,
    pub min_amplitude: Option<f32>,
    pub max_latency_ms: Option<u64>,
    pub adaptive_tolerance: Option<bool>,
    pub user_level: Option<u8>,
    pub instrument: Option<InstrumentProfile>,
    pub tolerances: Option<Tolerances>,
}

impl ConfigPatch {
    /// Merges this patch into `config`.
    pub fn apply(&self, config: &mut DetectionConfig) {
        if let Some(v) = self.sensitivity {
            config.sensitivity = v;
        }
        if let Some(v) = self.noise_floor_db {
            config.noise_floor_db = v;
        }
        if let Some(v) = self.min_amplitude {
            config.min_amplitude = v;
        }
        if let Some(v) = self.max_latency_ms {
            config.max_latency_ms = v;
        }
        if let Some(v) = self.adaptive_tolerance {
            config.adaptive_tolerance = v;
        }
        if let Some(v) = self.user_level {
            config.user_level = v;
        }
        if let Some(v) = &self.instrument {
            config.instrument = v.clone();
        }
        if let Some(v) = &self.tolerances {
            config.tolerances = v.clone();
        }
    }
}
