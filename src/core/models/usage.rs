use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::models::credits::CreditsInfo;
use crate::core::providers::Provider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Fraction of the window's limit consumed (0.0 - 1.0)
    #[serde(default)]
    pub utilization: f64,
    /// Integer percent consumed (0 - 100), used when `utilization` is zero
    #[serde(default)]
    pub used_percent: u32,
    /// When the window resets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    /// Length of the window (e.g. 5 hours, 7 days)
    #[serde(
        default,
        with = "crate::core::models::option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub window: Option<Duration>,
}

impl UsageWindow {
    /// Consumed fraction, preferring `utilization` and falling back to `used_percent`.
    pub fn fraction(&self) -> f64 {
        if self.utilization != 0.0 {
            self.utilization
        } else {
            self.used_percent as f64 / 100.0
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// A provider account's full rate-limit snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInfo {
    /// Most immediate window (usually session/5-hour)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<UsageWindow>,
    /// Longer window (usually weekly/7-day)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<UsageWindow>,
    /// Premium-model window (e.g. Opus weekly limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tertiary: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<CreditsInfo>,
    /// Burn rate reported by the provider API, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn_rate: Option<BurnRateInfo>,
}

impl UsageInfo {
    /// The window with the highest utilization, with a label naming it.
    ///
    /// Ties keep the earlier window in primary, secondary, tertiary, per-model order.
    pub fn most_constrained(&self) -> Option<(String, &UsageWindow)> {
        let fixed = [
            ("primary", self.primary.as_ref()),
            ("secondary", self.secondary.as_ref()),
            ("tertiary", self.tertiary.as_ref()),
        ];
        let candidates = fixed
            .into_iter()
            .filter_map(|(label, w)| w.map(|w| (label.to_string(), w)))
            .chain(self.models.iter().map(|(model, w)| (model.clone(), w)));

        let mut best: Option<(String, &UsageWindow)> = None;
        for (label, window) in candidates {
            let better = match &best {
                Some((_, current)) => window.fraction() > current.fraction(),
                None => true,
            };
            if better {
                best = Some((label, window));
            }
        }
        best
    }
}

/// Engine input for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub profile: String,
    /// Provider id ("claude", "codex", ...); unknown ids are kept but not resolved
    #[serde(default)]
    pub provider: String,
    /// Session log directory for this profile's isolated home
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Whether this is the profile currently feeding the session ledger
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

impl ProfileSnapshot {
    pub fn new(profile: impl Into<String>, provider: impl Into<String>, usage: UsageInfo) -> Self {
        Self {
            profile: profile.into(),
            provider: provider.into(),
            log_dir: None,
            active: false,
            usage: Some(usage),
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        Provider::from_id(&self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(utilization: f64, used_percent: u32) -> UsageWindow {
        UsageWindow {
            utilization,
            used_percent,
            ..Default::default()
        }
    }

    #[test]
    fn fraction_prefers_utilization() {
        assert_eq!(window(0.42, 90).fraction(), 0.42);
        assert_eq!(window(0.0, 90).fraction(), 0.9);
        assert_eq!(window(0.0, 0).percent(), 0.0);
    }

    #[test]
    fn most_constrained_picks_highest() {
        let mut usage = UsageInfo {
            primary: Some(window(0.3, 0)),
            secondary: Some(window(0.0, 64)),
            tertiary: Some(window(0.1, 0)),
            ..Default::default()
        };
        let (label, w) = usage.most_constrained().unwrap();
        assert_eq!(label, "secondary");
        assert_eq!(w.used_percent, 64);

        usage.models.insert("claude-opus-4".into(), window(0.8, 0));
        let (label, _) = usage.most_constrained().unwrap();
        assert_eq!(label, "claude-opus-4");
    }

    #[test]
    fn most_constrained_none_without_windows() {
        assert!(UsageInfo::default().most_constrained().is_none());
    }

    #[test]
    fn zero_utilization_window_still_counts() {
        let usage = UsageInfo {
            primary: Some(window(0.0, 0)),
            ..Default::default()
        };
        assert!(usage.most_constrained().is_some());
    }

    #[test]
    fn parse_snapshot_json() {
        let json = r#"{
            "profile": "work",
            "provider": "claude",
            "active": true,
            "usage": {
                "primary": {"used_percent": 50, "resets_at": "2026-01-01T10:00:00Z", "window": 18000},
                "secondary": {"utilization": 0.2}
            }
        }"#;
        let snapshot: ProfileSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.provider(), Some(Provider::Claude));
        assert!(snapshot.active);
        let usage = snapshot.usage.unwrap();
        let primary = usage.primary.unwrap();
        assert_eq!(primary.window, Some(Duration::hours(5)));
        assert!(primary.resets_at.is_some());
    }

    #[test]
    fn unknown_provider_is_unresolved() {
        let snapshot = ProfileSnapshot::new("x", "someday", UsageInfo::default());
        assert!(snapshot.provider().is_none());
    }
}
