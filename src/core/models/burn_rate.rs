use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Horizon beyond which projections are clamped, keeping durations finite.
pub const MAX_PROJECTION_HOURS: f64 = 24.0 * 365.0 * 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBurnRate {
    pub tokens: u64,
    pub tokens_per_hour: f64,
    #[serde(default)]
    pub percent_per_hour: f64,
}

/// Output of a burn-rate calculation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRateInfo {
    pub tokens_per_minute: f64,
    pub tokens_per_hour: f64,
    /// Percent of the token limit consumed per hour; 0 when no limit is known
    #[serde(default)]
    pub percent_per_hour: f64,
    /// Sample window the rate was computed over
    #[serde(with = "crate::core::models::duration_secs")]
    pub window: Duration,
    #[serde(default)]
    pub sample_size: usize,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_model: BTreeMap<String, ModelBurnRate>,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub first_entry: DateTime<Utc>,
    #[serde(default)]
    pub last_entry: DateTime<Utc>,
}

/// Convert fractional hours into a duration, clamped to `[0, MAX_PROJECTION_HOURS]`.
pub fn duration_from_hours(hours: f64) -> Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return Duration::zero();
    }
    let hours = hours.min(MAX_PROJECTION_HOURS);
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Minutes in a duration as a float, keeping sub-minute precision.
pub fn minutes_f64(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 60_000.0
}

/// Percent of `token_limit` per hour that `tokens_per_hour` represents.
pub fn percent_of_limit(tokens_per_hour: f64, token_limit: u64, limit_window: Duration) -> f64 {
    let window_hours = minutes_f64(limit_window) / 60.0;
    if token_limit == 0 || window_hours <= 0.0 {
        return 0.0;
    }
    let limit_per_hour = token_limit as f64 / window_hours;
    tokens_per_hour / limit_per_hour * 100.0
}

impl BurnRateInfo {
    /// Time until `remaining_tokens` are consumed at this rate.
    pub fn project_depletion(&self, remaining_tokens: i64) -> Duration {
        if self.tokens_per_hour <= 0.0 || remaining_tokens <= 0 {
            return Duration::zero();
        }
        duration_from_hours(remaining_tokens as f64 / self.tokens_per_hour)
    }

    /// Tokens expected to be consumed over `duration` at this rate.
    pub fn project_usage_at(&self, duration: Duration) -> f64 {
        self.tokens_per_minute * minutes_f64(duration)
    }

    /// A copy with percent figures expressed against `token_limit` per `limit_window`.
    pub fn with_limit(&self, token_limit: u64, limit_window: Duration) -> Self {
        let mut info = self.clone();
        info.percent_per_hour = percent_of_limit(info.tokens_per_hour, token_limit, limit_window);
        for model in info.by_model.values_mut() {
            model.percent_per_hour =
                percent_of_limit(model.tokens_per_hour, token_limit, limit_window);
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(tokens_per_hour: f64) -> BurnRateInfo {
        BurnRateInfo {
            tokens_per_minute: tokens_per_hour / 60.0,
            tokens_per_hour,
            percent_per_hour: 0.0,
            window: Duration::hours(1),
            sample_size: 10,
            confidence: 0.5,
            by_model: BTreeMap::new(),
            total_tokens: 0,
            first_entry: Utc::now(),
            last_entry: Utc::now(),
        }
    }

    #[test]
    fn project_depletion_divides_by_hourly_rate() {
        let info = rate(6000.0);
        assert_eq!(info.project_depletion(3000), Duration::minutes(30));
        assert_eq!(info.project_depletion(12_000), Duration::hours(2));
    }

    #[test]
    fn project_depletion_degenerate_inputs_are_zero() {
        assert_eq!(rate(0.0).project_depletion(1000), Duration::zero());
        assert_eq!(rate(-5.0).project_depletion(1000), Duration::zero());
        assert_eq!(rate(6000.0).project_depletion(0), Duration::zero());
        assert_eq!(rate(6000.0).project_depletion(-10), Duration::zero());
    }

    #[test]
    fn project_usage_at_scales_by_minutes() {
        let info = rate(6000.0);
        assert!((info.project_usage_at(Duration::minutes(15)) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn with_limit_sets_percent_figures() {
        let mut info = rate(9000.0);
        info.by_model.insert(
            "m".into(),
            ModelBurnRate {
                tokens: 10,
                tokens_per_hour: 3000.0,
                percent_per_hour: 0.0,
            },
        );
        let limited = info.with_limit(10_000, Duration::hours(1));
        assert!((limited.percent_per_hour - 90.0).abs() < 1e-9);
        assert!((limited.by_model["m"].percent_per_hour - 30.0).abs() < 1e-9);
        assert_eq!(info.percent_per_hour, 0.0);
    }

    #[test]
    fn duration_from_hours_is_clamped() {
        assert_eq!(duration_from_hours(f64::INFINITY), Duration::zero());
        assert_eq!(duration_from_hours(f64::NAN), Duration::zero());
        assert_eq!(
            duration_from_hours(1e18),
            duration_from_hours(MAX_PROJECTION_HOURS)
        );
    }

    #[test]
    fn percent_of_limit_without_limit_is_zero() {
        assert_eq!(percent_of_limit(1000.0, 0, Duration::hours(5)), 0.0);
        assert_eq!(percent_of_limit(1000.0, 10, Duration::zero()), 0.0);
    }
}
