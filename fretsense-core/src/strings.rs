//! # String Frequency Analyzer
//!
//! Per-string pitch and quality metrics, recomputed from scratch every
//! frame. For each string the analyzer searches a ±1-semitone window of the
//! spectrum around the open-string reference for the dominant bin, refines
//! it to sub-bin accuracy with log-parabolic interpolation, and derives
//! amplitude, clarity, and cent deviation.
//!
//! Searching only near the expected note is deliberate: it trades precise
//! fretted-note tracking for robustness against octave and harmonic
//! confusion, which fits the product question of "does this string sound
//! like the expected chord tone".

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::tuning;

/// Half-width, in bins, of the neighborhood used for the clarity ratio.
const CLARITY_SPAN_BINS: usize = 2;

/// What went wrong on a single string. Set iff the string is not correct;
/// exactly one tag applies per string per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringProblem {
    /// Played, but the spectral energy is smeared: buzzing or damped.
    Muted,
    /// Played a clean pitch far from the expected note.
    WrongNote,
    /// Played the right note, but off by more than the cent tolerance.
    OutOfTune,
    /// No meaningful amplitude: the string was not struck.
    NotPlayed,
}

/// Analysis of one physical string for one frame. Value-like; owned by the
/// frame that produced it, never cached across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringAnalysis {
    /// 1-based string index, 1 = lowest-pitched string.
    pub string_number: usize,
    /// Note the open string should produce, from the instrument profile.
    pub expected_note: String,
    /// Nearest note to the detected fundamental; `None` when not played.
    pub detected_note: Option<String>,
    /// Detected fundamental frequency in Hz.
    pub frequency: f32,
    /// RMS amplitude of the frame, 0..1.
    pub amplitude: f32,
    /// Fraction of local spectral energy at the fundamental, 0..1.
    pub clarity: f32,
    /// Deviation from the expected note in cents.
    pub cents_off: f32,
    /// True when no problem tag applies.
    pub is_correct: bool,
    /// Set iff `is_correct` is false.
    pub problem: Option<StringProblem>,
}

/// Analyzes every string in the configured instrument profile against one
/// frame's magnitude spectrum and time-domain buffer.
pub fn analyze_strings(
    spectrum: &[f32],
    time_data: &[f32],
    config: &DetectionConfig,
    sample_rate: u32,
) -> Vec<StringAnalysis> {
    let amplitude = rms_amplitude(time_data);
    config
        .instrument
        .open_strings
        .iter()
        .enumerate()
        .map(|(i, &f0)| analyze_string(i + 1, f0, spectrum, amplitude, config, sample_rate))
        .collect()
}

fn analyze_string(
    string_number: usize,
    expected_freq: f32,
    spectrum: &[f32],
    amplitude: f32,
    config: &DetectionConfig,
    sample_rate: u32,
) -> StringAnalysis {
    let (frequency, fundamental_bin) = detect_fundamental(spectrum, expected_freq, sample_rate);
    let clarity = clarity_at(spectrum, fundamental_bin);
    let cents_off = tuning::cents_off(frequency, expected_freq);

    let is_played = amplitude > config.min_amplitude;
    let tol = &config.tolerances;

    // Exactly one classification path per string per frame.
    let problem = if !is_played {
        Some(StringProblem::NotPlayed)
    } else if clarity < tol.muted_clarity_max {
        Some(StringProblem::Muted)
    } else if cents_off.abs() > tol.out_of_tune_cents {
        Some(StringProblem::OutOfTune)
    } else if cents_off.abs() / 100.0 > tol.wrong_note_semitones {
        Some(StringProblem::WrongNote)
    } else {
        None
    };

    StringAnalysis {
        string_number,
        expected_note: tuning::note_name(expected_freq).unwrap_or_default(),
        detected_note: if is_played { tuning::note_name(frequency) } else { None },
        frequency,
        amplitude,
        clarity,
        cents_off,
        is_correct: problem.is_none(),
        problem,
    }
}

/// RMS amplitude of a time-domain buffer. This is the "was anything struck
/// at all" signal, shared by every string in the frame.
pub fn rms_amplitude(time_data: &[f32]) -> f32 {
    if time_data.is_empty() {
        return 0.0;
    }
    (time_data.iter().map(|&s| s * s).sum::<f32>() / time_data.len() as f32).sqrt()
}

/// Locates the dominant spectral bin within ±1 semitone of `expected_freq`
/// and refines it to sub-bin accuracy. Returns `(frequency_hz, peak_bin)`.
fn detect_fundamental(spectrum: &[f32], expected_freq: f32, sample_rate: u32) -> (f32, usize) {
    if spectrum.len() < 3 {
        return (expected_freq, 0);
    }
    let bin_hz = sample_rate as f32 / (2.0 * spectrum.len() as f32);
    let expected_bin = (expected_freq / bin_hz).round() as usize;

    // ±1 semitone expressed in bins for this string; at least one bin so
    // low strings can still move off their center.
    let radius = ((expected_freq * tuning::SEMITONE_SPREAD / bin_hz).round() as usize).max(1);

    let start = expected_bin.saturating_sub(radius).max(1);
    let end = (expected_bin + radius).min(spectrum.len() - 2);
    if start > end {
        return (expected_freq, expected_bin.min(spectrum.len() - 1));
    }

    let mut peak_bin = start;
    let mut peak_mag = f32::MIN;
    for (offset, &mag) in spectrum[start..=end].iter().enumerate() {
        if mag > peak_mag {
            peak_mag = mag;
            peak_bin = start + offset;
        }
    }

    (refine_peak(spectrum, peak_bin, bin_hz), peak_bin)
}

/// Log-parabolic interpolation over the peak bin and its neighbors, for
/// sub-bin frequency accuracy. Falls back to the raw bin center whenever
/// the fit is degenerate (silent neighbors, flat top).
fn refine_peak(spectrum: &[f32], peak_bin: usize, bin_hz: f32) -> f32 {
    let coarse = peak_bin as f32 * bin_hz;
    if peak_bin == 0 || peak_bin + 1 >= spectrum.len() {
        return coarse;
    }

    let y1 = spectrum[peak_bin - 1].ln();
    let y2 = spectrum[peak_bin].ln();
    let y3 = spectrum[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return coarse;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return coarse;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated = (peak_bin as f32 + peak_shift) * bin_hz;
    if interpolated.is_finite() && interpolated > 0.0 {
        interpolated
    } else {
        coarse
    }
}

/// Clarity: magnitude at the fundamental bin over the summed magnitudes of
/// its ±2-bin neighborhood. A clean single pitch concentrates energy in the
/// main lobe; mutes and buzzes smear it.
fn clarity_at(spectrum: &[f32], fundamental_bin: usize) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let fundamental = spectrum[fundamental_bin.min(spectrum.len() - 1)];
    let start = fundamental_bin.saturating_sub(CLARITY_SPAN_BINS);
    let end = (fundamental_bin + CLARITY_SPAN_BINS).min(spectrum.len() - 1);
    let total: f32 = spectrum[start..=end].iter().sum();
    if total > 0.0 { fundamental / total } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BUFFER_SIZE;
    use crate::fft;

    const SR: u32 = 44_100;

    fn sine(freq: f32, amp: f32) -> Vec<f32> {
        (0..BUFFER_SIZE)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    #[test]
    fn pure_sine_at_reference_is_correct() {
        let config = DetectionConfig::default();
        let time = sine(82.41, 0.5);
        let spectrum = fft::magnitude_spectrum(&time);
        let strings = analyze_strings(&spectrum, &time, &config, SR);

        let low_e = &strings[0];
        assert!(low_e.is_correct, "low E should be correct: {low_e:?}");
        assert_eq!(low_e.problem, None);
        assert_eq!(low_e.detected_note.as_deref(), Some("E2"));
        assert!(low_e.cents_off.abs() < 50.0, "cents: {}", low_e.cents_off);
    }

    #[test]
    fn silent_buffer_marks_every_string_not_played() {
        let config = DetectionConfig::default();
        let time = vec![0.0f32; BUFFER_SIZE];
        let spectrum = fft::magnitude_spectrum(&time);
        let strings = analyze_strings(&spectrum, &time, &config, SR);

        assert_eq!(strings.len(), 6);
        for s in &strings {
            assert_eq!(s.problem, Some(StringProblem::NotPlayed), "{s:?}");
            assert!(!s.is_correct);
            assert_eq!(s.detected_note, None);
        }
    }

    #[test]
    fn sharp_string_classifies_out_of_tune() {
        let config = DetectionConfig::default();
        // ~75 cents sharp of low E.
        let freq = 82.41 * 2.0_f32.powf(75.0 / 1200.0);
        let time = sine(freq, 0.5);
        let spectrum = fft::magnitude_spectrum(&time);
        let strings = analyze_strings(&spectrum, &time, &config, SR);

        assert_eq!(strings[0].problem, Some(StringProblem::OutOfTune), "{:?}", strings[0]);
    }

    #[test]
    fn quiet_signal_is_not_played_before_anything_else() {
        let config = DetectionConfig::default();
        // Well below min_amplitude once RMS'd.
        let time = sine(82.41, 0.05);
        let spectrum = fft::magnitude_spectrum(&time);
        let strings = analyze_strings(&spectrum, &time, &config, SR);

        // not_played wins even though the pitch itself is clean: no string
        // carries two problem tags.
        assert_eq!(strings[0].problem, Some(StringProblem::NotPlayed));
    }

    #[test]
    fn smeared_spectrum_classifies_muted() {
        let config = DetectionConfig::default();
        // Loud in the time domain, but flat noise around the low-E window.
        let time = sine(82.41, 0.5);
        let mut spectrum = vec![0.0f32; BUFFER_SIZE / 2];
        for bin in 2..20 {
            spectrum[bin] = 0.3;
        }
        let strings = analyze_strings(&spectrum, &time, &config, SR);
        let low_e = &strings[0];
        assert!(low_e.clarity < 0.3, "clarity: {}", low_e.clarity);
        assert_eq!(low_e.problem, Some(StringProblem::Muted));
    }

    #[test]
    fn bass_profile_analyzes_four_strings() {
        let config = DetectionConfig {
            instrument: crate::tuning::InstrumentProfile::bass(),
            ..Default::default()
        };
        let time = vec![0.0f32; BUFFER_SIZE];
        let spectrum = fft::magnitude_spectrum(&time);
        let strings = analyze_strings(&spectrum, &time, &config, SR);
        assert_eq!(strings.len(), 4);
        assert_eq!(strings[0].expected_note, "E1");
    }

    #[test]
    fn rms_of_unit_sine() {
        let time = sine(440.0, 1.0);
        let rms = rms_amplitude(&time);
        assert!((rms - 0.707).abs() < 0.01, "rms: {rms}");
    }
}
