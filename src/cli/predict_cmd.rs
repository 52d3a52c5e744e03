use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cli::output::{print_json, OutputFormat, OutputOptions};
use crate::cli::{renderer, snapshots};
use crate::core::config::AppConfig;
use crate::core::forecast::predictor::{filter_by_warning, most_urgent, PredictionEngine};
use crate::core::formatter::format_duration;
use crate::core::ledger::SessionLedger;
use crate::core::logs::scanner::JsonlScanner;
use crate::core::logs::LogScanner;
use crate::core::models::prediction::{Prediction, WarningLevel};
use crate::core::models::usage::ProfileSnapshot;

#[derive(Serialize)]
struct PredictPayload<'a> {
    predictions: Vec<&'a Prediction>,
    most_urgent: Option<&'a Prediction>,
}

pub fn parse_warning(value: &str) -> Result<WarningLevel> {
    match value.to_lowercase().as_str() {
        "none" => Ok(WarningLevel::None),
        "approaching" => Ok(WarningLevel::Approaching),
        "imminent" => Ok(WarningLevel::Imminent),
        other => bail!(
            "Invalid warning level: '{}' (must be none|approaching|imminent)",
            other
        ),
    }
}

/// Ledger for the active profile, seeded from its logs over the ledger window.
///
/// Returns `None` when no snapshot is active, the active profile has no log
/// directory, or the scan fails.
pub fn seed_session_ledger(
    snapshots: &[ProfileSnapshot],
    config: &AppConfig,
    scanner: &dyn LogScanner,
    now: DateTime<Utc>,
) -> Option<Arc<SessionLedger>> {
    let active = snapshots.iter().find(|s| s.active)?;
    let dir = active
        .log_dir
        .clone()
        .or_else(|| active.provider().and_then(|p| p.default_log_dir()))?;

    let ledger = SessionLedger::new(config.ledger_config());
    let entries = match scanner.scan(&dir, now - ledger.config().window) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(profile = %active.profile, error = %e, "could not seed session ledger");
            return None;
        }
    };
    let merged = ledger.merge_log_data(&entries);
    let pruned = ledger.prune_at(now);
    debug!(profile = %active.profile, merged, pruned, "seeded session ledger");
    Some(Arc::new(ledger))
}

/// Build the engine from config and forecast every snapshot off the async runtime.
pub async fn forecast(
    snapshots: Vec<ProfileSnapshot>,
    config: &AppConfig,
) -> Result<Vec<Prediction>> {
    let config = config.clone();
    let predictions = tokio::task::spawn_blocking(move || {
        let scanner: Arc<dyn LogScanner> = Arc::new(JsonlScanner);
        let ledger = seed_session_ledger(&snapshots, &config, scanner.as_ref(), Utc::now());
        let engine = PredictionEngine::with_default_sources(
            config.prediction_options(),
            ledger,
            scanner,
            None,
        );
        engine.predict_all(&snapshots)
    })
    .await?;
    Ok(predictions)
}

pub async fn run(
    snapshots_path: Option<PathBuf>,
    profile: Option<String>,
    warning: Option<String>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let level = warning.as_deref().map(parse_warning).transpose()?;
    let loaded = snapshots::load(snapshots_path.as_deref())?;
    let mut selected = snapshots::select_profile(loaded, profile.as_deref())?;
    snapshots::apply_config(&mut selected, config);

    let predictions = forecast(selected, config).await?;
    let shown: Vec<&Prediction> = match level {
        Some(level) => filter_by_warning(&predictions, level),
        None => predictions.iter().collect(),
    };
    let urgent = most_urgent(&predictions, config.alert_options().min_confidence);

    match opts.format {
        OutputFormat::Text => {
            let now = Utc::now();
            let mut sections: Vec<String> = shown
                .iter()
                .map(|p| renderer::render_prediction(p, now, opts.use_color))
                .collect();
            if sections.is_empty() {
                sections.push("No profiles at that warning level.".to_string());
            }
            if let Some(p) = urgent {
                let line = format!(
                    "Most urgent: {} (limit in {})",
                    p.profile,
                    format_duration(p.time_to_depletion)
                );
                sections.push(if opts.use_color {
                    line.bold().to_string()
                } else {
                    line
                });
            }
            println!("{}", sections.join("\n\n"));
        }
        OutputFormat::Json => {
            print_json(
                &PredictPayload {
                    predictions: shown,
                    most_urgent: urgent,
                },
                opts,
            )?;
        }
    }

    if opts.verbose {
        for p in predictions.iter().filter(|p| p.error.is_some()) {
            eprintln!(
                "{}: {}",
                p.profile,
                p.error.as_deref().unwrap_or_default()
            );
        }
    }
    Ok(())
}
