use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::forecast::burn_rate::BurnRateOptions;
use crate::core::forecast::sources::{
    ApiSource, BurnRateSource, LogSource, SessionSource, SourceInput,
};
use crate::core::ledger::SessionLedger;
use crate::core::logs::LogScanner;
use crate::core::models::burn_rate::{duration_from_hours, BurnRateInfo};
use crate::core::models::prediction::{Prediction, PredictionError, WarningLevel};
use crate::core::models::usage::{ProfileSnapshot, UsageInfo, UsageWindow};
use crate::core::providers::Provider;

/// Data source recorded when the account is already at or past its limit.
pub const CURRENT_USAGE_SOURCE: &str = "current_usage";

/// Window length assumed when a snapshot does not report one.
const DEFAULT_LIMIT_WINDOW_HOURS: i64 = 5;

/// How a known window reset interacts with the projected depletion time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Report the reset time but never move the prediction to it.
    #[default]
    Informational,
    /// When the reset comes first, forecast the reset instead of depletion.
    CapAtReset,
}

#[derive(Debug, Clone)]
pub struct PredictionOptions {
    /// How far back the log source looks
    pub lookback: Duration,
    /// Trailing window for the live session burn rate
    pub session_window: Duration,
    pub burn_rate: BurnRateOptions,
    /// Time-to-depletion below this is imminent
    pub imminent_threshold: Duration,
    /// Time-to-depletion below this is approaching
    pub approaching_threshold: Duration,
    pub reset_policy: ResetPolicy,
    /// Token budget per provider for the constrained window
    pub token_limits: HashMap<Provider, u64>,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(2),
            session_window: Duration::hours(1),
            burn_rate: BurnRateOptions::default(),
            imminent_threshold: Duration::minutes(10),
            approaching_threshold: Duration::minutes(30),
            reset_policy: ResetPolicy::default(),
            token_limits: HashMap::new(),
        }
    }
}

impl PredictionOptions {
    /// Warning level for a time-to-depletion.
    pub fn classify(&self, time_to_depletion: Duration) -> WarningLevel {
        if time_to_depletion <= Duration::zero() {
            WarningLevel::None
        } else if time_to_depletion < self.imminent_threshold {
            WarningLevel::Imminent
        } else if time_to_depletion < self.approaching_threshold {
            WarningLevel::Approaching
        } else {
            WarningLevel::None
        }
    }
}

/// Forecasts time-to-depletion for profiles. Holds no state between calls
/// beyond its configuration and sources.
pub struct PredictionEngine {
    options: PredictionOptions,
    sources: Vec<Box<dyn BurnRateSource>>,
}

impl PredictionEngine {
    /// An engine with no burn-rate sources; add them with [`Self::with_source`].
    pub fn new(options: PredictionOptions) -> Self {
        Self {
            options,
            sources: Vec::new(),
        }
    }

    /// The standard chain: session ledger (if any), then logs, then the API rate.
    pub fn with_default_sources(
        options: PredictionOptions,
        ledger: Option<Arc<SessionLedger>>,
        scanner: Arc<dyn LogScanner>,
        log_dir: Option<std::path::PathBuf>,
    ) -> Self {
        let session_window = options.session_window;
        let lookback = options.lookback;
        let burn_rate = options.burn_rate.clone();

        let mut engine = Self::new(options);
        if let Some(ledger) = ledger {
            engine = engine.with_source(SessionSource::new(ledger, session_window));
        }
        engine
            .with_source(LogSource::new(scanner, lookback, burn_rate).with_log_dir(log_dir))
            .with_source(ApiSource)
    }

    /// Append a source at the lowest priority.
    pub fn with_source(mut self, source: impl BurnRateSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn options(&self) -> &PredictionOptions {
        &self.options
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn predict(&self, snapshot: &ProfileSnapshot) -> Prediction {
        self.predict_at(snapshot, Utc::now())
    }

    pub fn predict_at(&self, snapshot: &ProfileSnapshot, now: DateTime<Utc>) -> Prediction {
        let (mut prediction, usage, window) = match self.resolve(snapshot) {
            Ok(resolved) => resolved,
            Err(failed) => return failed,
        };
        if prediction.current_percent >= 100.0 {
            return exhausted(prediction, now);
        }

        let input = SourceInput {
            snapshot,
            usage,
            token_limit: snapshot
                .provider()
                .and_then(|p| self.options.token_limits.get(&p).copied()),
            limit_window: window
                .window
                .unwrap_or_else(|| Duration::hours(DEFAULT_LIMIT_WINDOW_HOURS)),
            now,
        };

        let mut selected: Option<BurnRateInfo> = None;
        let mut sources: Vec<String> = Vec::new();
        for source in &self.sources {
            let Some(info) = source.try_resolve(&input) else {
                continue;
            };
            if info.percent_per_hour <= 0.0 {
                debug!(source = source.name(), "burn rate has no percent figure");
                continue;
            }
            sources.push(source.name().to_string());
            if selected.is_none() {
                debug!(
                    profile = %snapshot.profile,
                    source = source.name(),
                    percent_per_hour = info.percent_per_hour,
                    "selected burn-rate source"
                );
                selected = Some(info);
            }
        }

        let Some(burn_rate) = selected else {
            return prediction.failed(PredictionError::InsufficientData);
        };
        prediction.data_sources = sources;
        self.project(prediction, burn_rate, now)
    }

    /// Forecast with an externally supplied burn rate, bypassing source selection.
    pub fn predict_with_burn_rate(
        &self,
        snapshot: &ProfileSnapshot,
        burn_rate: BurnRateInfo,
        source: &str,
    ) -> Prediction {
        self.predict_with_burn_rate_at(snapshot, burn_rate, source, Utc::now())
    }

    pub fn predict_with_burn_rate_at(
        &self,
        snapshot: &ProfileSnapshot,
        burn_rate: BurnRateInfo,
        source: &str,
        now: DateTime<Utc>,
    ) -> Prediction {
        let (mut prediction, _, _) = match self.resolve(snapshot) {
            Ok(resolved) => resolved,
            Err(failed) => return failed,
        };
        if prediction.current_percent >= 100.0 {
            return exhausted(prediction, now);
        }
        if burn_rate.percent_per_hour <= 0.0 {
            return prediction.failed(PredictionError::InsufficientData);
        }
        prediction.data_sources = vec![source.to_string()];
        self.project(prediction, burn_rate, now)
    }

    pub fn predict_all(&self, snapshots: &[ProfileSnapshot]) -> Vec<Prediction> {
        let now = Utc::now();
        snapshots.iter().map(|s| self.predict_at(s, now)).collect()
    }

    /// A prediction seeded from the snapshot's most constrained window.
    fn resolve<'a>(
        &self,
        snapshot: &'a ProfileSnapshot,
    ) -> Result<(Prediction, &'a UsageInfo, &'a UsageWindow), Prediction> {
        let prediction = Prediction::new(&snapshot.profile, snapshot.provider());
        let Some(usage) = snapshot.usage.as_ref() else {
            return Err(prediction.failed(PredictionError::NoUsageData));
        };
        let Some((label, window)) = usage.most_constrained() else {
            return Err(prediction.failed(PredictionError::NoUsageWindow));
        };

        let mut prediction = prediction;
        prediction.window = Some(label);
        prediction.current_percent = window.percent();
        prediction.resets_at = window.resets_at;
        Ok((prediction, usage, window))
    }

    /// Steps shared by every forecast once a burn rate is chosen.
    fn project(
        &self,
        mut prediction: Prediction,
        burn_rate: BurnRateInfo,
        now: DateTime<Utc>,
    ) -> Prediction {
        let remaining_percent = 100.0 - prediction.current_percent;
        let hours = remaining_percent / burn_rate.percent_per_hour;
        let mut predicted = now + duration_from_hours(hours);

        if self.options.reset_policy == ResetPolicy::CapAtReset {
            if let Some(reset) = prediction.resets_at {
                if reset < predicted {
                    predicted = reset;
                }
            }
        }
        let time_to_depletion = (predicted - now).max(Duration::zero());

        let source_count = prediction.data_sources.len().max(1);
        let mut confidence = (burn_rate.confidence * (1.0 + 0.1 * (source_count - 1) as f64)).min(1.0);
        if burn_rate.sample_size < 5 {
            confidence *= 0.9;
        }

        prediction.predicted_depletion = Some(predicted);
        prediction.time_to_depletion = time_to_depletion;
        prediction.warning = self.options.classify(time_to_depletion);
        prediction.confidence = confidence.clamp(0.0, 1.0);
        prediction.burn_rate = Some(burn_rate);
        prediction
    }
}

fn exhausted(mut prediction: Prediction, now: DateTime<Utc>) -> Prediction {
    prediction.predicted_depletion = Some(now);
    prediction.time_to_depletion = Duration::zero();
    prediction.warning = WarningLevel::Imminent;
    prediction.confidence = 1.0;
    prediction.data_sources = vec![CURRENT_USAGE_SOURCE.to_string()];
    prediction
}

/// The valid prediction with the smallest positive time-to-depletion.
pub fn most_urgent(predictions: &[Prediction], min_confidence: f64) -> Option<&Prediction> {
    predictions
        .iter()
        .filter(|p| p.error.is_none())
        .filter(|p| p.time_to_depletion > Duration::zero())
        .filter(|p| p.confidence >= min_confidence)
        .min_by_key(|p| p.time_to_depletion)
}

/// Predictions at or above `level`.
pub fn filter_by_warning(predictions: &[Prediction], level: WarningLevel) -> Vec<&Prediction> {
    predictions.iter().filter(|p| p.warning >= level).collect()
}
