use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::forecast::alerts::AlertOptions;
use crate::core::forecast::burn_rate::BurnRateOptions;
use crate::core::forecast::predictor::{PredictionOptions, ResetPolicy};
use crate::core::ledger::LedgerConfig;
use crate::core::providers::Provider;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub max_entries: usize,
    pub window_minutes: i64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            window_minutes: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurnRateSection {
    pub min_sample_size: usize,
    pub min_timespan_minutes: i64,
}

impl Default for BurnRateSection {
    fn default() -> Self {
        Self {
            min_sample_size: 3,
            min_timespan_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionSection {
    pub lookback_minutes: i64,
    pub session_window_minutes: i64,
    pub imminent_minutes: i64,
    pub approaching_minutes: i64,
    pub reset_policy: ResetPolicy,
}

impl Default for PredictionSection {
    fn default() -> Self {
        Self {
            lookback_minutes: 120,
            session_window_minutes: 60,
            imminent_minutes: 10,
            approaching_minutes: 30,
            reset_policy: ResetPolicy::Informational,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    pub warning_percent: f64,
    pub critical_percent: f64,
    pub rotation_threshold_minutes: i64,
    pub min_confidence: f64,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            warning_percent: 70.0,
            critical_percent: 85.0,
            rotation_threshold_minutes: 30,
            min_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    /// Token budget of the provider's constrained window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_limit: Option<u64>,
    /// Overrides the provider's default session log root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl ProviderConfig {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            token_limit: None,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub burn_rate: BurnRateSection,
    #[serde(default)]
    pub prediction: PredictionSection,
    #[serde(default)]
    pub alerts: AlertsSection,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            ledger: LedgerSection::default(),
            burn_rate: BurnRateSection::default(),
            prediction: PredictionSection::default(),
            alerts: AlertsSection::default(),
            providers: vec![ProviderConfig::new("claude"), ProviderConfig::new("codex")],
        }
    }
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("ait").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| Provider::from_id(&p.id) == Some(provider))
    }

    pub fn log_dir_for(&self, provider: Provider) -> Option<PathBuf> {
        self.provider(provider).and_then(|p| p.log_dir.clone())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        let defaults = LedgerConfig::default();
        LedgerConfig {
            max_entries: if self.ledger.max_entries > 0 {
                self.ledger.max_entries
            } else {
                defaults.max_entries
            },
            window: minutes_or(self.ledger.window_minutes, defaults.window),
        }
    }

    pub fn burn_rate_options(&self) -> BurnRateOptions {
        let defaults = BurnRateOptions::default();
        BurnRateOptions {
            min_sample_size: self.burn_rate.min_sample_size.max(1),
            min_timespan: minutes_or(self.burn_rate.min_timespan_minutes, defaults.min_timespan),
            ..defaults
        }
    }

    pub fn prediction_options(&self) -> PredictionOptions {
        let defaults = PredictionOptions::default();
        let p = &self.prediction;
        let token_limits: HashMap<Provider, u64> = self
            .providers
            .iter()
            .filter_map(|c| Some((Provider::from_id(&c.id)?, c.token_limit?)))
            .filter(|(_, limit)| *limit > 0)
            .collect();

        PredictionOptions {
            lookback: minutes_or(p.lookback_minutes, defaults.lookback),
            session_window: minutes_or(p.session_window_minutes, defaults.session_window),
            burn_rate: self.burn_rate_options(),
            imminent_threshold: minutes_or(p.imminent_minutes, defaults.imminent_threshold),
            approaching_threshold: minutes_or(
                p.approaching_minutes,
                defaults.approaching_threshold,
            ),
            reset_policy: p.reset_policy,
            token_limits,
        }
    }

    pub fn alert_options(&self) -> AlertOptions {
        let a = &self.alerts;
        AlertOptions {
            warning_percent: a.warning_percent,
            critical_percent: a.critical_percent,
            rotation_threshold: minutes_or(
                a.rotation_threshold_minutes,
                AlertOptions::default().rotation_threshold,
            ),
            min_confidence: a.min_confidence,
        }
        .normalized()
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.ledger.max_entries == 0 {
            issues.push("ledger.max_entries must be greater than 0".to_string());
        }
        if self.burn_rate.min_sample_size < 2 {
            issues.push("burn_rate.min_sample_size must be at least 2".to_string());
        }

        let minutes = [
            ("ledger.window_minutes", self.ledger.window_minutes),
            ("burn_rate.min_timespan_minutes", self.burn_rate.min_timespan_minutes),
            ("prediction.lookback_minutes", self.prediction.lookback_minutes),
            ("prediction.session_window_minutes", self.prediction.session_window_minutes),
            ("prediction.imminent_minutes", self.prediction.imminent_minutes),
            ("prediction.approaching_minutes", self.prediction.approaching_minutes),
            ("alerts.rotation_threshold_minutes", self.alerts.rotation_threshold_minutes),
        ];
        for (key, value) in minutes {
            if value <= 0 {
                issues.push(format!("{} must be positive (got {})", key, value));
            } else if value > MAX_MINUTES {
                issues.push(format!(
                    "{} is out of range (got {}, max {})",
                    key, value, MAX_MINUTES
                ));
            }
        }
        if self.prediction.imminent_minutes >= self.prediction.approaching_minutes {
            issues.push(
                "prediction.imminent_minutes must be less than approaching_minutes".to_string(),
            );
        }

        let a = &self.alerts;
        for (key, value) in [
            ("alerts.warning_percent", a.warning_percent),
            ("alerts.critical_percent", a.critical_percent),
        ] {
            if !(0.0..=100.0).contains(&value) || value == 0.0 {
                issues.push(format!("{} must be in (0, 100] (got {})", key, value));
            }
        }
        if a.warning_percent >= a.critical_percent {
            issues.push("alerts.warning_percent must be below critical_percent".to_string());
        }
        if !(0.0..=1.0).contains(&a.min_confidence) {
            issues.push(format!(
                "alerts.min_confidence must be within 0..1 (got {})",
                a.min_confidence
            ));
        }

        for p in &self.providers {
            if Provider::from_id(&p.id).is_none() {
                issues.push(format!("Unknown provider ID: '{}'", p.id));
            }
            if p.token_limit == Some(0) {
                issues.push(format!("Provider '{}': token_limit must be positive", p.id));
            }
            if let Some(dir) = &p.log_dir {
                if !dir.is_dir() {
                    issues.push(format!(
                        "Provider '{}': log_dir '{}' does not exist",
                        p.id,
                        dir.display()
                    ));
                }
            }
        }
        issues
    }
}

/// Longest configurable span: ten years.
pub const MAX_MINUTES: i64 = 60 * 24 * 366 * 10;

/// A positive minute count no longer than [`MAX_MINUTES`], as a duration.
pub fn minutes_in_range(minutes: i64) -> Option<Duration> {
    if minutes <= 0 || minutes > MAX_MINUTES {
        return None;
    }
    Duration::try_minutes(minutes)
}

fn minutes_or(minutes: i64, default: Duration) -> Duration {
    minutes_in_range(minutes).unwrap_or(default)
}
