//! # Per-frame Detection Pipeline
//!
//! Glues one frame's worth of analysis together: magnitude spectrum ->
//! {string analyses, chroma} -> chord identification -> problem diagnosis
//! -> assembled [`DetectionResult`]. Every value produced here is owned by
//! the frame; nothing is cached between calls.
//!
//! The chord merge rule: a confirmed expected chord wins; otherwise the
//! blind chroma guess is used when its confidence clears the acceptance
//! bar; otherwise no chord is reported for the frame, even when an
//! expected chord was supplied with sub-threshold confidence (deliberate
//! fall-through, kept from the product's observed behavior).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::DetectionResult;
use crate::audio::BUFFER_SIZE;
use crate::chord::{self, Chord};
use crate::chroma;
use crate::config::DetectionConfig;
use crate::error::FrameError;
use crate::fft;
use crate::problems::{self, ChordProblem, ProblemKind, Severity};
use crate::strings;

/// Analyzes one time-domain capture frame end to end.
///
/// Fails only on a malformed buffer; the session loop treats that as a
/// skipped frame, not a session error.
pub fn analyze_frame(
    time_data: &[f32],
    config: &DetectionConfig,
    expected: Option<Chord>,
    sample_rate: u32,
) -> Result<DetectionResult, FrameError> {
    if time_data.len() != BUFFER_SIZE {
        return Err(FrameError::BadFrameLength {
            expected: BUFFER_SIZE,
            got: time_data.len(),
        });
    }
    let spectrum = fft::magnitude_spectrum(time_data);
    Ok(analyze_spectrum(&spectrum, time_data, config, expected, sample_rate))
}

/// Pipeline body, starting from an already-computed magnitude spectrum.
pub fn analyze_spectrum(
    spectrum: &[f32],
    time_data: &[f32],
    config: &DetectionConfig,
    expected: Option<Chord>,
    sample_rate: u32,
) -> DetectionResult {
    let tol = &config.tolerances;

    let string_analyses = strings::analyze_strings(spectrum, time_data, config, sample_rate);

    let chroma = chroma::extract(spectrum, sample_rate, config.noise_floor_db);
    let blind_guess = chord::match_templates(&chroma, tol.blind_match_min_score);

    let validation = chord::validate_expected(
        &string_analyses,
        expected,
        config.min_amplitude,
        tol.chord_min_confidence,
    );

    // Confirmed expected chord wins; blind guess is the fallback.
    let mut detected_chord = validation.chord;
    let mut confidence = validation.confidence;
    if detected_chord.is_none() {
        if let Some(guess) = &blind_guess {
            if guess.confidence > tol.chord_min_confidence {
                detected_chord = Some(guess.chord);
                confidence = guess.confidence;
            }
        }
    }

    let mut problems = problems::diagnose(&string_analyses, tol);

    // Confidently hearing a different chord than the one being practiced is
    // itself a fingering problem.
    if let (Some(exp), Some(det)) = (expected, detected_chord) {
        if det != exp && confidence > tol.mismatch_report_confidence {
            problems.push(ChordProblem {
                kind: ProblemKind::WrongFingering,
                severity: Severity::High,
                description: format!("You appear to be playing {det} instead"),
                affected_strings: Vec::new(),
                suggestion: format!("Check that you are making the {exp} shape"),
            });
        }
    }

    // Highest severity first; ladder order breaks ties.
    problems.sort_by(|a, b| b.severity.cmp(&a.severity));

    let suggestions = problems::suggestions(&problems, &validation.quality, config.user_level);

    DetectionResult {
        detected_chord,
        confidence,
        timestamp_ms: now_ms(),
        quality: validation.quality,
        strings: string_analyses,
        problems,
        suggestions,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
