use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::models::prediction::Prediction;
use crate::core::providers::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ApproachingLimit,
    ImminentLimit,
    SwitchRecommended,
    AllProfilesLow,
}

impl AlertType {
    pub fn title(&self) -> &'static str {
        match self {
            Self::ApproachingLimit => "Approaching usage limit",
            Self::ImminentLimit => "Usage limit imminent",
            Self::SwitchRecommended => "Profile rotation recommended",
            Self::AllProfilesLow => "All profiles running low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub urgency: Urgency,
    pub message: String,
    pub suggested_action: String,
    #[serde(with = "crate::core::models::duration_secs")]
    pub time_until: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// The prediction this alert was derived from; absent for batch-level alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Prediction>,
}
