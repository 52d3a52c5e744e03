//! Burn-rate sources, tried in priority order by the prediction engine.

use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::forecast::burn_rate::{calculate_at, BurnRateOptions, BurnSample};
use crate::core::ledger::SessionLedger;
use crate::core::logs::LogScanner;
use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::models::usage::{ProfileSnapshot, UsageInfo};
use crate::core::providers::Provider;

/// Everything a source may look at when resolving a burn rate for one profile.
pub struct SourceInput<'a> {
    pub snapshot: &'a ProfileSnapshot,
    pub usage: &'a UsageInfo,
    /// Token budget of the constrained window, when configured
    pub token_limit: Option<u64>,
    /// Length of the constrained window
    pub limit_window: Duration,
    pub now: DateTime<Utc>,
}

impl SourceInput<'_> {
    fn express_against_limit(&self, info: BurnRateInfo) -> BurnRateInfo {
        match self.token_limit {
            Some(limit) => info.with_limit(limit, self.limit_window),
            None => info,
        }
    }
}

pub trait BurnRateSource: Send + Sync {
    /// Label recorded in a prediction's data sources.
    fn name(&self) -> &'static str;

    fn try_resolve(&self, input: &SourceInput<'_>) -> Option<BurnRateInfo>;
}

/// Live burn rate from the session ledger of the active profile.
pub struct SessionSource {
    ledger: Arc<SessionLedger>,
    window: Duration,
}

impl SessionSource {
    pub fn new(ledger: Arc<SessionLedger>, window: Duration) -> Self {
        Self { ledger, window }
    }
}

impl BurnRateSource for SessionSource {
    fn name(&self) -> &'static str {
        "session"
    }

    fn try_resolve(&self, input: &SourceInput<'_>) -> Option<BurnRateInfo> {
        if !input.snapshot.active {
            return None;
        }
        let info = self.ledger.burn_rate_at(self.window, input.now)?;
        Some(input.express_against_limit(info))
    }
}

/// Historical burn rate computed from the profile's session logs.
pub struct LogSource {
    scanner: Arc<dyn LogScanner>,
    lookback: Duration,
    options: BurnRateOptions,
    log_dir_override: Option<PathBuf>,
}

impl LogSource {
    pub fn new(scanner: Arc<dyn LogScanner>, lookback: Duration, options: BurnRateOptions) -> Self {
        Self {
            scanner,
            lookback,
            options,
            log_dir_override: None,
        }
    }

    /// Use `dir` for snapshots that name no log directory of their own.
    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir_override = dir;
        self
    }

    fn log_dir(&self, snapshot: &ProfileSnapshot) -> Option<PathBuf> {
        snapshot
            .log_dir
            .clone()
            .or_else(|| self.log_dir_override.clone())
            .or_else(|| snapshot.provider().and_then(|p: Provider| p.default_log_dir()))
    }
}

impl BurnRateSource for LogSource {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn try_resolve(&self, input: &SourceInput<'_>) -> Option<BurnRateInfo> {
        let dir = self.log_dir(input.snapshot)?;
        let since = input.now - self.lookback;
        let entries = match self.scanner.scan(&dir, since) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(profile = %input.snapshot.profile, error = %e, "log scan failed");
                return None;
            }
        };
        let samples: Vec<BurnSample> = entries.iter().map(BurnSample::from).collect();

        let mut options = self.options.clone();
        if let Some(limit) = input.token_limit {
            options = options.with_limit(limit, input.limit_window);
        }
        let info = calculate_at(&samples, self.lookback, &options, input.now);
        if info.is_none() {
            debug!(
                profile = %input.snapshot.profile,
                samples = samples.len(),
                "log sample rejected by calculator"
            );
        }
        info
    }
}

/// Burn rate reported alongside the account snapshot.
pub struct ApiSource;

impl BurnRateSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    fn try_resolve(&self, input: &SourceInput<'_>) -> Option<BurnRateInfo> {
        input.usage.burn_rate.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::models::token::TokenEntry;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scanner returning canned entries, or an error when `fail` is set.
    #[derive(Default)]
    pub struct FakeScanner {
        pub entries: Vec<TokenEntry>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl LogScanner for FakeScanner {
        fn scan(&self, _log_dir: &Path, since: DateTime<Utc>) -> anyhow::Result<Vec<TokenEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("permission denied");
            }
            Ok(self
                .entries
                .iter()
                .filter(|e| e.timestamp >= since)
                .cloned()
                .collect())
        }
    }
}
