//! Recency decay for answer weighting (pure math, no DB).

use chrono::{DateTime, Utc};

/// Fraction of an answer's influence kept per elapsed week.
pub const WEEKLY_RETENTION: f64 = 0.9;

const SECONDS_PER_WEEK: f64 = 7.0 * 86_400.0;

/// Weight of an answer `weeks` old: `0.9^weeks`.
///
/// Negative or non-finite ages count as fresh.
pub fn recency_weight(weeks: f64) -> f64 {
    if !weeks.is_finite() || weeks <= 0.0 {
        return 1.0;
    }
    WEEKLY_RETENTION.powf(weeks)
}

/// Continuous weeks between `at` and `now`. Timestamps in the future are age 0.
pub fn weeks_elapsed(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - at).num_milliseconds() as f64 / 1000.0;
    (secs / SECONDS_PER_WEEK).max(0.0)
}
