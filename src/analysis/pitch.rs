//! # Spectral Pitch Detection
//!
//! Estimates the dominant frequency of a frame as the strongest bin of its spectrum.
//!
//! ## Method:
//! 1. Forward FFT over the whole frame (no window, no zero padding)
//! 2. Keep the non-negative half: bins `0..=N/2`, i.e. 0 Hz up to Nyquist
//! 3. Pick the bin with the largest magnitude (first one wins on ties)
//! 4. Convert with `bin * sample_rate / N`
//!
//! ## Resolution:
//! Bins are `sample_rate / N` Hz wide and there is no sub-bin interpolation, so a 1024
//! sample frame at 44.1kHz resolves ~43 Hz while a 4096 sample frame resolves ~10.8 Hz.
//! Frame length is the client's latency/precision trade-off.
//!
//! The DC bin takes part in the search, so a frame with a strong offset can report 0 Hz.

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Mutex;

/// Dominant-frequency estimator.
///
/// Holds an FFT planner so that repeated frame lengths reuse their plans. The planner is
/// only locked while a plan is fetched; the transform itself runs unlocked.
pub struct PitchDetector {
    sample_rate: u32,
    planner: Mutex<FftPlanner<f32>>,
}

impl PitchDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Width of one frequency bin for a frame of `frame_len` samples.
    pub fn bin_width_hz(&self, frame_len: usize) -> f32 {
        if frame_len == 0 {
            return 0.0;
        }
        self.sample_rate as f32 / frame_len as f32
    }

    /// Magnitudes of bins `0..=N/2`.
    pub fn magnitude_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let n = samples.len();
        if n == 0 {
            return Vec::new();
        }

        let fft = {
            let mut planner = self.planner.lock().unwrap_or_else(|e| e.into_inner());
            planner.plan_fft_forward(n)
        };

        let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
        fft.process(&mut buffer);

        buffer[..=n / 2].iter().map(|c| c.norm()).collect()
    }

    /// Dominant frequency in Hz. An empty or all-zero frame resolves to bin 0, i.e. 0 Hz.
    pub fn dominant_frequency(&self, samples: &[f32]) -> f32 {
        let magnitudes = self.magnitude_spectrum(samples);
        peak_bin(&magnitudes) as f32 * self.bin_width_hz(samples.len())
    }
}

/// Index of the first largest magnitude.
fn peak_bin(magnitudes: &[f32]) -> usize {
    let mut best = 0;
    for (i, &m) in magnitudes.iter().enumerate().skip(1) {
        if m > magnitudes[best] {
            best = i;
        }
    }
    best
}
