use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::core::models::burn_rate::{minutes_f64, percent_of_limit, BurnRateInfo, ModelBurnRate};
use crate::core::models::token::TokenEntry;

/// Calculator input: one timestamped token count.
#[derive(Debug, Clone, PartialEq)]
pub struct BurnSample {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub tokens: u64,
}

impl From<&TokenEntry> for BurnSample {
    fn from(entry: &TokenEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            model: entry.model.clone(),
            tokens: entry.total_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurnRateOptions {
    /// Fewer samples than this are rejected
    pub min_sample_size: usize,
    /// Samples spanning less than this are rejected (strictly less)
    pub min_timespan: Duration,
    /// Token budget of the limit window, when known
    pub token_limit: Option<u64>,
    /// Length of the limit window the budget applies to
    pub limit_window: Option<Duration>,
}

impl Default for BurnRateOptions {
    fn default() -> Self {
        Self {
            min_sample_size: 3,
            min_timespan: Duration::minutes(5),
            token_limit: None,
            limit_window: None,
        }
    }
}

impl BurnRateOptions {
    /// Thresholds for live, low-volume session data.
    pub fn relaxed() -> Self {
        Self {
            min_sample_size: 2,
            min_timespan: Duration::minutes(1),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, token_limit: u64, limit_window: Duration) -> Self {
        self.token_limit = Some(token_limit);
        self.limit_window = Some(limit_window);
        self
    }

    fn percent_per_hour(&self, tokens_per_hour: f64) -> f64 {
        match (self.token_limit, self.limit_window) {
            (Some(limit), Some(window)) => percent_of_limit(tokens_per_hour, limit, window),
            _ => 0.0,
        }
    }
}

/// Compute a burn rate over the trailing `window` ending now.
pub fn calculate(
    samples: &[BurnSample],
    window: Duration,
    opts: &BurnRateOptions,
) -> Option<BurnRateInfo> {
    calculate_at(samples, window, opts, Utc::now())
}

/// Compute a burn rate over the trailing `window` ending at `now`.
///
/// Returns `None` when the sample is too small or spans too little time.
/// Samples need not be sorted.
pub fn calculate_at(
    samples: &[BurnSample],
    window: Duration,
    opts: &BurnRateOptions,
    now: DateTime<Utc>,
) -> Option<BurnRateInfo> {
    let cutoff = now - window;
    let filtered: Vec<&BurnSample> = samples.iter().filter(|s| s.timestamp >= cutoff).collect();

    if filtered.len() < opts.min_sample_size.max(1) {
        return None;
    }

    let first = filtered.iter().map(|s| s.timestamp).min()?;
    let last = filtered.iter().map(|s| s.timestamp).max()?;
    let elapsed = last - first;
    if elapsed < opts.min_timespan || elapsed <= Duration::zero() {
        return None;
    }

    let elapsed_minutes = minutes_f64(elapsed);
    let total_tokens: u64 = filtered.iter().map(|s| s.tokens).sum();
    let tokens_per_minute = total_tokens as f64 / elapsed_minutes;
    let tokens_per_hour = tokens_per_minute * 60.0;

    let mut model_tokens: BTreeMap<String, u64> = BTreeMap::new();
    for sample in &filtered {
        *model_tokens.entry(sample.model.clone()).or_default() += sample.tokens;
    }
    let by_model = model_tokens
        .into_iter()
        .map(|(model, tokens)| {
            let per_hour = tokens as f64 / elapsed_minutes * 60.0;
            let rate = ModelBurnRate {
                tokens,
                tokens_per_hour: per_hour,
                percent_per_hour: opts.percent_per_hour(per_hour),
            };
            (model, rate)
        })
        .collect();

    let mut timestamps: Vec<DateTime<Utc>> = filtered.iter().map(|s| s.timestamp).collect();
    timestamps.sort();
    let confidence = confidence(&timestamps, elapsed, window, now);

    Some(BurnRateInfo {
        tokens_per_minute,
        tokens_per_hour,
        percent_per_hour: opts.percent_per_hour(tokens_per_hour),
        window,
        sample_size: filtered.len(),
        confidence,
        by_model,
        total_tokens,
        first_entry: first,
        last_entry: last,
    })
}

/// Sum of sample-size, coverage, recency and consistency factors, clamped to [0, 1].
/// `sorted` must be in ascending order.
fn confidence(
    sorted: &[DateTime<Utc>],
    elapsed: Duration,
    window: Duration,
    now: DateTime<Utc>,
) -> f64 {
    let sample_factor = (sorted.len() as f64 / 20.0).min(1.0) * 0.4;

    let window_minutes = minutes_f64(window);
    let coverage_factor = if window_minutes > 0.0 {
        (minutes_f64(elapsed) / window_minutes).min(1.0) * 0.3
    } else {
        0.0
    };

    let recency_factor = match sorted.last() {
        Some(newest) => recency_factor(now - *newest),
        None => 0.0,
    };

    let total = sample_factor + coverage_factor + recency_factor + consistency_factor(sorted);
    total.clamp(0.0, 1.0)
}

fn recency_factor(age: Duration) -> f64 {
    if age < Duration::minutes(5) {
        0.2
    } else if age < Duration::minutes(30) {
        0.15
    } else if age < Duration::hours(1) {
        0.1
    } else if age < Duration::hours(2) {
        0.05
    } else {
        0.0
    }
}

/// Scores how evenly spaced the samples are, via the coefficient of variation of the gaps.
fn consistency_factor(sorted: &[DateTime<Utc>]) -> f64 {
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64)
        .collect();
    if gaps.len() < 3 {
        return 0.05;
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return 0.02;
    }
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    let cv = variance.sqrt() / mean;

    if cv < 0.5 {
        0.1
    } else if cv < 1.0 {
        0.07
    } else if cv < 2.0 {
        0.04
    } else {
        0.02
    }
}
