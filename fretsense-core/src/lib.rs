//! # fretsense-core
//!
//! Headless real-time chord detection for guitar practice. Captures audio
//! frames, analyzes each string of the configured instrument against its
//! expected chord tone, identifies the sounding chord from a chroma
//! vector, diagnoses playing problems, and hands complete per-frame
//! results to the consumer.
//!
//! The crate is UI-agnostic: a CLI, a GUI, or a test harness drives a
//! [`session::DetectionSession`] and receives [`DetectionResult`] values
//! through a callback. All analysis is frame-local; nothing is smoothed or
//! cached across frames, so every result stands on its own.

pub mod audio;
pub mod chord;
pub mod chroma;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod problems;
pub mod session;
pub mod strings;
pub mod tuning;

use serde::{Deserialize, Serialize};

pub use audio::FrameSource;
pub use chord::{Chord, ChordGuess, ChordQuality, QualityReport};
pub use config::{ConfigPatch, DetectionConfig, Tolerances};
pub use error::{AudioError, FrameError, SessionError};
pub use problems::{ChordProblem, ProblemKind, Severity};
pub use session::{DetectionSession, PerformanceStats, SessionState};
pub use strings::{StringAnalysis, StringProblem};

/// Complete analysis of one capture frame.
///
/// Owned by the frame that produced it: consumers may hold results as long
/// as they like without pinning any engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The identified chord, if any cleared its confidence bar.
    pub detected_chord: Option<Chord>,
    /// Confidence in `detected_chord`, 0..1. Meaningful even when no chord
    /// was reported (it is then the best sub-threshold figure).
    pub confidence: f32,
    /// Wall-clock capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Frame-level quality summary.
    pub quality: QualityReport,
    /// Per-string analyses, index 0 = lowest-pitched string.
    pub strings: Vec<StringAnalysis>,
    /// Diagnosed problems, highest severity first.
    pub problems: Vec<ChordProblem>,
    /// Deduplicated practice suggestions derived from the problems, the
    /// quality score, and the configured skill level.
    pub suggestions: Vec<String>,
}
