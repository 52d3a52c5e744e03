use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::fmt;

use crate::core::models::alert::{Alert, Urgency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl From<Urgency> for Severity {
    fn from(urgency: Urgency) -> Self {
        match urgency {
            Urgency::High => Self::Critical,
            Urgency::Medium => Self::Warning,
            Urgency::Low => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub action: String,
}

impl From<&Alert> for Notification {
    fn from(alert: &Alert) -> Self {
        let title = match &alert.profile {
            Some(profile) => format!("{}: {}", alert.alert_type.title(), profile),
            None => alert.alert_type.title().to_string(),
        };
        Self {
            severity: alert.urgency.into(),
            title,
            body: alert.message.clone(),
            action: alert.suggested_action.clone(),
        }
    }
}

pub trait Notifier {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to stderr, colored by severity.
pub struct StderrNotifier {
    pub use_color: bool,
}

impl StderrNotifier {
    pub fn render(&self, n: &Notification) -> String {
        let tag = format!("[{}]", n.severity);
        if !self.use_color {
            return format!("{} {}\n  {}\n  → {}", tag, n.title, n.body, n.action);
        }
        let tag = match n.severity {
            Severity::Critical => tag.red().bold(),
            Severity::Warning => tag.yellow().bold(),
            Severity::Info => tag.cyan(),
        };
        format!("{} {}\n  {}\n  → {}", tag, n.title.bold(), n.body, n.action)
    }
}

impl Notifier for StderrNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        eprintln!("{}", self.render(notification));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::alert::AlertType;
    use chrono::Duration;

    fn alert(alert_type: AlertType, urgency: Urgency, profile: Option<&str>) -> Alert {
        Alert {
            alert_type,
            urgency,
            message: "work will reach its limit in 8m (91% used)".into(),
            suggested_action: "Rotate off 'work'".into(),
            time_until: Duration::minutes(8),
            profile: profile.map(String::from),
            provider: None,
            prediction: None,
        }
    }

    #[test]
    fn urgency_maps_to_severity() {
        assert_eq!(Severity::from(Urgency::High), Severity::Critical);
        assert_eq!(Severity::from(Urgency::Medium), Severity::Warning);
        assert_eq!(Severity::from(Urgency::Low), Severity::Info);
    }

    #[test]
    fn titles_follow_alert_type() {
        let n = Notification::from(&alert(AlertType::ImminentLimit, Urgency::High, Some("work")));
        assert_eq!(n.title, "Usage limit imminent: work");
        assert_eq!(n.severity, Severity::Critical);

        let n = Notification::from(&alert(AlertType::AllProfilesLow, Urgency::High, None));
        assert_eq!(n.title, "All profiles running low");
    }

    #[test]
    fn plain_render_has_no_escape_codes() {
        let n = Notification::from(&alert(
            AlertType::ApproachingLimit,
            Urgency::Medium,
            Some("work"),
        ));
        let text = StderrNotifier { use_color: false }.render(&n);
        assert!(text.starts_with("[warning] Approaching usage limit: work"));
        assert!(!text.contains('\x1b'));
    }
}
