//! Math utility functions

/// Index of the maximum value; the first one wins on ties, NaN never wins
pub fn argmax(x: &[f32]) -> usize {
    x.iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (idx, &v)| {
            if v > best.1 {
                (idx, v)
            } else {
                best
            }
        })
        .0
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f64.powi(decimals);
    ((value as f64 * factor).round() / factor) as f32
}
