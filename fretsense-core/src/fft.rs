//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency-domain transformation for the per-frame analysis pipeline.
//! Handles DC-offset removal, Hann windowing, and magnitude-spectrum
//! extraction on top of RustFFT.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate low-string analysis
//! - Magnitude spectrum truncated at Nyquist

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
///
/// A DC component leaks a large spurious peak into the lowest bins, which
/// sit right where bass and low-E fundamentals live.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the buffer to reduce spectral leakage.
///
/// Tapering the frame to zero at the edges keeps each string's fundamental
/// concentrated in a narrow main lobe, which both the peak search and the
/// clarity measure depend on.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n == 0 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Performs a forward FFT on a signal and returns the complex spectrum.
///
/// Processing steps:
/// 1. DC offset removal
/// 2. Hann windowing
/// 3. Forward FFT transformation
pub fn perform_fft(signal: &[f32]) -> Vec<Complex<f32>> {
    let mut processed_signal = signal.to_vec();
    remove_dc_offset(&mut processed_signal);
    apply_hann_window(&mut processed_signal);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(processed_signal.len());

    let mut buffer: Vec<Complex<f32>> = processed_signal
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();

    fft.process(&mut buffer);
    buffer
}

/// Computes the magnitude spectrum of a time-domain frame.
///
/// Only the first half of the FFT output is kept (Nyquist theorem); bin `i`
/// corresponds to `i * sample_rate / signal.len()` Hz.
pub fn magnitude_spectrum(signal: &[f32]) -> Vec<f32> {
    let spectrum = perform_fft(signal);
    spectrum
        .iter()
        .take(signal.len() / 2)
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}
