use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::providers::Provider;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    #[default]
    None,
    Approaching,
    Imminent,
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Approaching => write!(f, "approaching"),
            Self::Imminent => write!(f, "imminent"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("no usage data")]
    NoUsageData,
    #[error("no usage window available")]
    NoUsageWindow,
    #[error("insufficient data for prediction")]
    InsufficientData,
}

/// One profile's depletion forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub profile: String,
    pub provider: Option<Provider>,
    /// Label of the window the forecast is based on ("primary", a model name, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    pub current_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_rate: Option<BurnRateInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_depletion: Option<DateTime<Utc>>,
    #[serde(with = "crate::core::models::duration_secs")]
    pub time_to_depletion: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub warning: WarningLevel,
    #[serde(default)]
    pub data_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Prediction {
    pub fn new(profile: impl Into<String>, provider: Option<Provider>) -> Self {
        Self {
            profile: profile.into(),
            provider,
            window: None,
            current_percent: 0.0,
            burn_rate: None,
            predicted_depletion: None,
            time_to_depletion: Duration::zero(),
            resets_at: None,
            confidence: 0.0,
            warning: WarningLevel::None,
            data_sources: Vec::new(),
            error: None,
        }
    }

    pub fn failed(mut self, err: PredictionError) -> Self {
        self.error = Some(err.to_string());
        self
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none() && !self.data_sources.is_empty()
    }

    /// Whether the reset arrives before the projected depletion.
    pub fn resets_first(&self) -> bool {
        match (self.resets_at, self.predicted_depletion) {
            (Some(reset), Some(depletion)) => reset < depletion,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_levels_are_ordered() {
        assert!(WarningLevel::None < WarningLevel::Approaching);
        assert!(WarningLevel::Approaching < WarningLevel::Imminent);
        assert_eq!(WarningLevel::default(), WarningLevel::None);
    }

    #[test]
    fn validity_requires_source_and_no_error() {
        let mut prediction = Prediction::new("work", Some(Provider::Claude));
        assert!(!prediction.is_valid());
        prediction.data_sources.push("logs".into());
        assert!(prediction.is_valid());
        let failed = prediction.failed(PredictionError::InsufficientData);
        assert!(!failed.is_valid());
        assert_eq!(
            failed.error.as_deref(),
            Some("insufficient data for prediction")
        );
    }

    #[test]
    fn prediction_json_uses_seconds() {
        let mut prediction = Prediction::new("work", None);
        prediction.time_to_depletion = Duration::minutes(2);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["time_to_depletion"], 120);
        assert_eq!(json["warning"], "none");
    }
}
