//! Energy gate for local microphone audio.
//!
//! Uses mean absolute amplitude as a simple energy metric, enough to tell a
//! spoken utterance from room noise before paying for a recognition call.

/// Compute the energy level of an audio chunk.
pub fn detect(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum: f32 = chunk.iter().map(|s| s.abs()).sum();
    sum / chunk.len() as f32
}

/// Whether any `window`-sized slice of `samples` is louder than `threshold`.
pub fn has_speech(samples: &[f32], window: usize, threshold: f32) -> bool {
    samples
        .chunks(window.max(1))
        .any(|chunk| detect(chunk) >= threshold)
}
