//! # Chroma Extraction Module
//!
//! Folds the magnitude spectrum into a 12-bin pitch-class energy vector
//! (C..B), independent of octave. Only the fundamental range relevant to
//! fretted instruments (65 Hz - 1 kHz) contributes, bins buried under the
//! noise floor are skipped, and the result is normalized so the strongest
//! pitch class is 1.0. A silent frame folds to an all-zero vector, never
//! NaN.

use serde::{Deserialize, Serialize};

use crate::tuning;

/// Lower edge of the folded fundamental range (about C2).
pub const CHROMA_MIN_HZ: f32 = 65.0;

/// Upper edge of the folded fundamental range.
pub const CHROMA_MAX_HZ: f32 = 1000.0;

/// 12-bin pitch-class energy vector, index 0 = C .. 11 = B.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChromaVector(pub [f32; 12]);

impl ChromaVector {
    /// True when no bin carries any energy (silent frame).
    pub fn is_silent(&self) -> bool {
        self.0.iter().all(|&v| v == 0.0)
    }

    /// Energy of a single pitch class.
    pub fn bin(&self, pitch_class: usize) -> f32 {
        self.0[pitch_class % 12]
    }
}

/// Folds a magnitude spectrum into a [`ChromaVector`].
///
/// `noise_floor_db` is relative to the frame's peak magnitude: the original
/// product thresholded absolute dBFS from its platform analyser, but linear
/// FFT magnitudes carry no fixed reference, so the floor tracks the peak.
/// Bin weights stay linear, matching the original's dB-to-linear
/// conversion before accumulation.
pub fn extract(spectrum: &[f32], sample_rate: u32, noise_floor_db: f32) -> ChromaVector {
    let mut chroma = [0.0f32; 12];
    if spectrum.is_empty() {
        return ChromaVector(chroma);
    }

    let peak = spectrum.iter().fold(0.0f32, |a, &b| a.max(b));
    if peak <= 0.0 {
        return ChromaVector(chroma);
    }

    // bin i covers i * sample_rate / (2 * len) Hz up to Nyquist.
    let bin_hz = sample_rate as f32 / (2.0 * spectrum.len() as f32);
    let min_bin = (CHROMA_MIN_HZ / bin_hz).floor() as usize;
    let max_bin = ((CHROMA_MAX_HZ / bin_hz).floor() as usize).min(spectrum.len());

    for (i, &magnitude) in spectrum.iter().enumerate().take(max_bin).skip(min_bin) {
        if magnitude <= 0.0 {
            continue;
        }
        let relative_db = 20.0 * (magnitude / peak).log10();
        if relative_db < noise_floor_db {
            continue;
        }
        let frequency = i as f32 * bin_hz;
        if let Some(pc) = tuning::pitch_class(frequency) {
            chroma[pc] += magnitude;
        }
    }

    // Normalize so the strongest pitch class is 1.0.
    let max_val = chroma.iter().fold(0.0f32, |a, &b| a.max(b));
    if max_val > 0.0 {
        for v in chroma.iter_mut() {
            *v /= max_val;
        }
    }

    ChromaVector(chroma)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;
    const BINS: usize = 2048;

    fn bin_of(freq: f32) -> usize {
        (freq * 2.0 * BINS as f32 / SR as f32).round() as usize
    }

    #[test]
    fn silent_spectrum_folds_to_zero_vector() {
        let chroma = extract(&vec![0.0; BINS], SR, -70.0);
        assert!(chroma.is_silent());
        assert!(chroma.0.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn single_tone_dominates_its_pitch_class() {
        let mut spectrum = vec![0.0f32; BINS];
        spectrum[bin_of(440.0)] = 1.0;
        let chroma = extract(&spectrum, SR, -70.0);
        assert_eq!(chroma.bin(9), 1.0); // A
        assert!(chroma.0.iter().enumerate().all(|(i, &v)| i == 9 || v < 0.5));
    }

    #[test]
    fn octaves_fold_into_one_bin() {
        let mut spectrum = vec![0.0f32; BINS];
        spectrum[bin_of(110.0)] = 1.0; // A2
        spectrum[bin_of(220.0)] = 1.0; // A3
        spectrum[bin_of(440.0)] = 1.0; // A4
        let chroma = extract(&spectrum, SR, -70.0);
        assert_eq!(chroma.bin(9), 1.0);
    }

    #[test]
    fn noise_floor_drops_weak_bins() {
        let mut spectrum = vec![0.0f32; BINS];
        spectrum[bin_of(440.0)] = 1.0;
        // 80 dB below the peak: under the -70 dB floor.
        spectrum[bin_of(261.63)] = 1.0e-4;
        let chroma = extract(&spectrum, SR, -70.0);
        assert_eq!(chroma.bin(0), 0.0); // C was discarded
    }

    #[test]
    fn out_of_range_energy_is_ignored() {
        let mut spectrum = vec![0.0f32; BINS];
        spectrum[bin_of(2000.0)] = 1.0; // above the folded range
        let chroma = extract(&spectrum, SR, -70.0);
        assert!(chroma.is_silent());
    }
}
