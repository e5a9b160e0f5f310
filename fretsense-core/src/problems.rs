//! # Problem Diagnoser
//!
//! Deterministic rule ladder over the per-string classifications,
//! independent of chord identity. Problems are derived, never persisted:
//! each frame recomputes them from scratch. Suggestion text is generated
//! per problem, topped up with quality-keyed encouragement and
//! skill-level tips, then deduplicated preserving first-seen order.

use serde::{Deserialize, Serialize};

use crate::chord::QualityReport;
use crate::config::Tolerances;
use crate::strings::{StringAnalysis, StringProblem};

/// Category of a chord-level problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    MutedString,
    WrongFingering,
    PoorSustain,
    TimingIssue,
    /// Despite the name, this specifically flags strings that were not
    /// struck at all (legacy label kept for consumer compatibility).
    VolumeInconsistent,
}

/// How much a problem hurts the chord. Ordering is Low < Medium < High so
/// result lists can sort highest-severity first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One diagnosed problem with human-readable guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordProblem {
    pub kind: ProblemKind,
    pub severity: Severity,
    pub description: String,
    /// 1-based indices of the strings involved; empty when the problem is
    /// not attributable to specific strings.
    pub affected_strings: Vec<usize>,
    pub suggestion: String,
}

/// Runs the diagnostic rule ladder over one frame's string analyses.
pub fn diagnose(strings: &[StringAnalysis], tolerances: &Tolerances) -> Vec<ChordProblem> {
    let mut problems = Vec::new();

    let muted: Vec<usize> = strings
        .iter()
        .filter(|s| s.problem == Some(StringProblem::Muted))
        .map(|s| s.string_number)
        .collect();
    if !muted.is_empty() {
        problems.push(ChordProblem {
            kind: ProblemKind::MutedString,
            severity: if muted.len() > 2 { Severity::High } else { Severity::Medium },
            description: format!("{} muted string(s)", muted.len()),
            affected_strings: muted,
            suggestion: "Press harder with your fingertips or adjust your hand position".into(),
        });
    }

    let unplayed: Vec<usize> = strings
        .iter()
        .filter(|s| s.problem == Some(StringProblem::NotPlayed))
        .map(|s| s.string_number)
        .collect();
    if !unplayed.is_empty() {
        problems.push(ChordProblem {
            kind: ProblemKind::VolumeInconsistent,
            severity: if unplayed.len() > 1 { Severity::Medium } else { Severity::Low },
            description: format!("{} string(s) not struck", unplayed.len()),
            affected_strings: unplayed,
            suggestion: "Strum every string of the chord together".into(),
        });
    }

    let out_of_tune: Vec<usize> = strings
        .iter()
        .filter(|s| s.problem == Some(StringProblem::OutOfTune))
        .map(|s| s.string_number)
        .collect();
    if !out_of_tune.is_empty() {
        problems.push(ChordProblem {
            kind: ProblemKind::WrongFingering,
            severity: Severity::Medium,
            description: "Imprecise intonation detected".into(),
            affected_strings: out_of_tune,
            suggestion: "Check that your fingers sit just behind the right frets".into(),
        });
    }

    // Uneven attack across strings reads as poor sustain.
    if !strings.is_empty() {
        let amplitudes: Vec<f32> = strings.iter().map(|s| s.amplitude).collect();
        let mean = amplitudes.iter().sum::<f32>() / amplitudes.len() as f32;
        let variance = amplitudes.iter().map(|a| (a - mean).powi(2)).sum::<f32>()
            / amplitudes.len() as f32;
        let consistency = 1.0 - (variance * 10.0).min(1.0);

        if consistency < tolerances.consistency_min {
            problems.push(ChordProblem {
                kind: ProblemKind::PoorSustain,
                severity: Severity::Low,
                description: "Uneven volume across strings".into(),
                affected_strings: strings.iter().map(|s| s.string_number).collect(),
                suggestion: "Keep constant pressure on every fretting finger".into(),
            });
        }
    }

    problems
}

/// Generates the deduplicated suggestion list for one frame: per-problem
/// guidance first, then encouragement keyed to the overall quality, then
/// tips for the user's skill band.
pub fn suggestions(
    problems: &[ChordProblem],
    quality: &QualityReport,
    user_level: u8,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |text: String, out: &mut Vec<String>| {
        if !out.contains(&text) {
            out.push(text);
        }
    };

    for problem in problems {
        push(problem.suggestion.clone(), &mut out);
    }

    if quality.overall > 0.8 {
        push("Excellent! Keep practicing this chord.".into(), &mut out);
    } else if quality.overall > 0.6 {
        push(
            "Good work! Focus on the strings that still need adjustment.".into(),
            &mut out,
        );
    } else {
        push(
            "Keep practicing. Every attempt gets you closer!".into(),
            &mut out,
        );
    }

    if user_level <= 2 {
        push("Remember: place all your fingers before you strum.".into(), &mut out);
        push("Rest your thumb behind the neck for support.".into(), &mut out);
    } else if user_level <= 5 {
        push("Work on smooth transitions between chords.".into(), &mut out);
        push("Keep your fretting arm relaxed for better control.".into(), &mut out);
    } else {
        push("Push the tempo while keeping every note clean.".into(), &mut out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(n: usize, problem: Option<StringProblem>, amplitude: f32) -> StringAnalysis {
        StringAnalysis {
            string_number: n,
            expected_note: "E2".into(),
            detected_note: None,
            frequency: 82.41,
            amplitude,
            clarity: 0.5,
            cents_off: 0.0,
            is_correct: problem.is_none(),
            problem,
        }
    }

    #[test]
    fn two_muted_strings_is_medium_three_is_high() {
        let tol = Tolerances::default();
        let two = vec![
            string(1, None, 0.3),
            string(4, Some(StringProblem::Muted), 0.3),
            string(5, Some(StringProblem::Muted), 0.3),
        ];
        let problems = diagnose(&two, &tol);
        let muted = problems.iter().find(|p| p.kind == ProblemKind::MutedString).unwrap();
        assert_eq!(muted.severity, Severity::Medium);
        assert_eq!(muted.affected_strings, vec![4, 5]);

        let three = vec![
            string(1, Some(StringProblem::Muted), 0.3),
            string(2, Some(StringProblem::Muted), 0.3),
            string(3, Some(StringProblem::Muted), 0.3),
        ];
        let problems = diagnose(&three, &tol);
        let muted = problems.iter().find(|p| p.kind == ProblemKind::MutedString).unwrap();
        assert_eq!(muted.severity, Severity::High);
    }

    #[test]
    fn unstruck_strings_flag_volume_inconsistent() {
        let tol = Tolerances::default();
        let one = vec![string(1, None, 0.3), string(2, Some(StringProblem::NotPlayed), 0.3)];
        let problems = diagnose(&one, &tol);
        let p = problems.iter().find(|p| p.kind == ProblemKind::VolumeInconsistent).unwrap();
        assert_eq!(p.severity, Severity::Low);

        let two = vec![
            string(1, Some(StringProblem::NotPlayed), 0.3),
            string(2, Some(StringProblem::NotPlayed), 0.3),
        ];
        let problems = diagnose(&two, &tol);
        let p = problems.iter().find(|p| p.kind == ProblemKind::VolumeInconsistent).unwrap();
        assert_eq!(p.severity, Severity::Medium);
    }

    #[test]
    fn out_of_tune_maps_to_wrong_fingering() {
        let tol = Tolerances::default();
        let strings = vec![string(3, Some(StringProblem::OutOfTune), 0.3)];
        let problems = diagnose(&strings, &tol);
        let p = problems.iter().find(|p| p.kind == ProblemKind::WrongFingering).unwrap();
        assert_eq!(p.severity, Severity::Medium);
        assert_eq!(p.affected_strings, vec![3]);
    }

    #[test]
    fn wildly_uneven_amplitudes_flag_poor_sustain() {
        let tol = Tolerances::default();
        let strings = vec![string(1, None, 0.9), string(2, None, 0.05), string(3, None, 0.9)];
        let problems = diagnose(&strings, &tol);
        assert!(problems.iter().any(|p| p.kind == ProblemKind::PoorSustain));
    }

    #[test]
    fn even_amplitudes_do_not_flag_sustain() {
        let tol = Tolerances::default();
        let strings: Vec<_> = (1..=6).map(|n| string(n, None, 0.3)).collect();
        let problems = diagnose(&strings, &tol);
        assert!(problems.is_empty());
    }

    #[test]
    fn clean_frame_diagnoses_nothing() {
        let tol = Tolerances::default();
        let strings: Vec<_> = (1..=6).map(|n| string(n, None, 0.25)).collect();
        assert!(diagnose(&strings, &tol).is_empty());
    }

    #[test]
    fn suggestions_deduplicate_preserving_order() {
        let problem = ChordProblem {
            kind: ProblemKind::MutedString,
            severity: Severity::Medium,
            description: "x".into(),
            affected_strings: vec![],
            suggestion: "Same tip".into(),
        };
        let quality = QualityReport { overall: 0.9, ..Default::default() };
        let out = suggestions(&[problem.clone(), problem], &quality, 9);
        assert_eq!(out[0], "Same tip");
        assert_eq!(out.iter().filter(|s| s.as_str() == "Same tip").count(), 1);
    }

    #[test]
    fn encouragement_tracks_overall_quality() {
        let quality = |overall| QualityReport { overall, ..Default::default() };
        assert!(suggestions(&[], &quality(0.9), 9)[0].starts_with("Excellent"));
        assert!(suggestions(&[], &quality(0.7), 9)[0].starts_with("Good work"));
        assert!(suggestions(&[], &quality(0.2), 9)[0].starts_with("Keep practicing"));
    }

    #[test]
    fn tip_bands_differ_by_skill_level() {
        let quality = QualityReport { overall: 0.9, ..Default::default() };
        let beginner = suggestions(&[], &quality, 1);
        let middle = suggestions(&[], &quality, 4);
        let advanced = suggestions(&[], &quality, 8);
        assert!(beginner.iter().any(|s| s.contains("place all your fingers")));
        assert!(middle.iter().any(|s| s.contains("smooth transitions")));
        assert!(advanced.iter().any(|s| s.contains("tempo")));
        assert_ne!(beginner, middle);
        assert_ne!(middle, advanced);
    }
}
