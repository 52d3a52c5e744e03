use chrono::Duration;

use crate::core::formatter::format_duration;
use crate::core::models::alert::{Alert, AlertType, Urgency};
use crate::core::models::prediction::{Prediction, WarningLevel};

#[derive(Debug, Clone, PartialEq)]
pub struct AlertOptions {
    /// Utilization (percent) at which a profile counts as approaching its limit
    pub warning_percent: f64,
    /// Utilization (percent) at which a profile counts as imminent
    pub critical_percent: f64,
    /// Recommend rotation when depletion is closer than this
    pub rotation_threshold: Duration,
    /// Rotation is only recommended from predictions at least this confident
    pub min_confidence: f64,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            warning_percent: 70.0,
            critical_percent: 85.0,
            rotation_threshold: Duration::minutes(30),
            min_confidence: 0.3,
        }
    }
}

impl AlertOptions {
    /// Replace zero or negative thresholds with their defaults.
    pub fn normalized(&self) -> Self {
        let defaults = Self::default();
        Self {
            warning_percent: positive_or(self.warning_percent, defaults.warning_percent),
            critical_percent: positive_or(self.critical_percent, defaults.critical_percent),
            rotation_threshold: if self.rotation_threshold > Duration::zero() {
                self.rotation_threshold
            } else {
                defaults.rotation_threshold
            },
            min_confidence: positive_or(self.min_confidence, defaults.min_confidence),
        }
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        default
    }
}

/// Derive alerts from a batch of predictions.
///
/// Per profile: at most one classification alert (imminent or approaching) and,
/// independently, a rotation recommendation. One batch-level alert is added
/// when no considered profile is comfortably below the thresholds.
pub fn generate_alerts(predictions: &[Prediction], opts: &AlertOptions) -> Vec<Alert> {
    let opts = opts.normalized();
    let mut alerts: Vec<Alert> = Vec::new();

    for prediction in predictions {
        if let Some(alert) = classify(prediction, &opts) {
            alerts.push(alert);
        }
        if should_rotate(prediction, &opts) {
            alerts.push(profile_alert(
                prediction,
                AlertType::SwitchRecommended,
                Urgency::High,
                "Rotation recommended based on burn rate".to_string(),
            ));
        }
    }

    if let Some(alert) = all_profiles_low(predictions, &opts) {
        alerts.push(alert);
    }
    alerts
}

fn classify(prediction: &Prediction, opts: &AlertOptions) -> Option<Alert> {
    let percent = prediction.current_percent;
    let (alert_type, urgency) =
        if prediction.warning >= WarningLevel::Imminent || percent >= opts.critical_percent {
            (AlertType::ImminentLimit, Urgency::High)
        } else if prediction.warning >= WarningLevel::Approaching || percent >= opts.warning_percent
        {
            (AlertType::ApproachingLimit, Urgency::Medium)
        } else {
            return None;
        };
    Some(profile_alert(
        prediction,
        alert_type,
        urgency,
        describe(prediction),
    ))
}

fn should_rotate(prediction: &Prediction, opts: &AlertOptions) -> bool {
    prediction.time_to_depletion > Duration::zero()
        && prediction.confidence >= opts.min_confidence
        && prediction.time_to_depletion < opts.rotation_threshold
}

fn all_profiles_low(predictions: &[Prediction], opts: &AlertOptions) -> Option<Alert> {
    let considered: Vec<&Prediction> = predictions
        .iter()
        .filter(|p| p.warning != WarningLevel::None || p.current_percent > 0.0)
        .collect();
    if considered.is_empty() {
        return None;
    }
    let any_comfortable = considered
        .iter()
        .any(|p| p.warning < WarningLevel::Approaching && p.current_percent < opts.warning_percent);
    if any_comfortable {
        return None;
    }

    Some(Alert {
        alert_type: AlertType::AllProfilesLow,
        urgency: Urgency::High,
        message: format!(
            "All {} tracked profiles are near their usage limits",
            considered.len()
        ),
        suggested_action: "Wait for a window reset or add another profile".to_string(),
        time_until: considered
            .iter()
            .map(|p| p.time_to_depletion)
            .filter(|d| *d > Duration::zero())
            .min()
            .unwrap_or_else(Duration::zero),
        profile: None,
        provider: None,
        prediction: None,
    })
}

fn profile_alert(
    prediction: &Prediction,
    alert_type: AlertType,
    urgency: Urgency,
    message: String,
) -> Alert {
    Alert {
        alert_type,
        urgency,
        message,
        suggested_action: suggested_action(prediction),
        time_until: prediction.time_to_depletion,
        profile: Some(prediction.profile.clone()),
        provider: prediction.provider,
        prediction: Some(prediction.clone()),
    }
}

fn describe(prediction: &Prediction) -> String {
    let name = &prediction.profile;
    if prediction.time_to_depletion > Duration::zero() {
        format!(
            "{} will reach its limit in {} ({:.0}% used)",
            name,
            format_duration(prediction.time_to_depletion),
            prediction.current_percent
        )
    } else if prediction.current_percent > 0.0 {
        format!("{} is at {:.0}% of its limit", name, prediction.current_percent)
    } else {
        format!("{}: status unknown", name)
    }
}

fn suggested_action(prediction: &Prediction) -> String {
    match prediction.provider {
        Some(provider) => format!(
            "Rotate off '{}' with `{}`",
            prediction.profile,
            provider.rotation_command()
        ),
        None => "Switch to another profile with remaining capacity".to_string(),
    }
}
