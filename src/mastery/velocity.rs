//! Learning velocity: trend of recent submission scores.

use crate::types::Submission;

/// Least-squares slope of scores against their position (0, 1, 2, ...).
///
/// `submissions` must be oldest first. Fewer than two points give 0.
pub fn learning_velocity(submissions: &[Submission]) -> f64 {
    let scores: Vec<f64> = submissions.iter().map(|s| s.score).collect();
    slope(&scores)
}

fn slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (y - mean_y);
        var += dx * dx;
    }
    if var == 0.0 {
        return 0.0;
    }
    cov / var
}
