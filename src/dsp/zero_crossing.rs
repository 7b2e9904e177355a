//! Zero-crossing frequency estimation
//!
//! Coarse, transform-free estimate used for initial acquisition and for the
//! background sanity check while fine tracking runs. Counts sign changes of
//! the mean-removed signal; two changes make one cycle.

/// Estimate the dominant frequency of a raw sample window.
///
/// Returns `None` when the window is too short, the duration is not
/// positive, or the signal never crosses its mean.
pub fn estimate_frequency(values: &[f64], duration_s: f64) -> Option<f64> {
    if values.len() < 2 || duration_s <= 0.0 {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let crossings = values
        .windows(2)
        .filter(|w| (w[0] - mean >= 0.0) != (w[1] - mean >= 0.0))
        .count();

    if crossings == 0 {
        return None;
    }
    Some(crossings as f64 / 2.0 / duration_s)
}
