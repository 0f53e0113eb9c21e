/// Root-mean-square amplitude of a frame. Returns 0.0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// `true` when the frame should be dropped as background noise.
///
/// Non-finite loudness (NaN or infinite samples, or a sum of squares that overflowed
/// `f32`) is treated as silence as well, so it never reaches the classifier.
pub fn is_silent(loudness: f32, noise_floor: f32) -> bool {
    !loudness.is_finite() || loudness <= noise_floor
}
