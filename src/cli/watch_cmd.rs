use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::AppConfig;
use crate::core::ledger::{LedgerStats, SessionLedger};
use crate::core::logs::scanner::JsonlScanner;
use crate::core::logs::LogScanner;
use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::providers::Provider;

/// Rescan overlap so records flushed late are still picked up.
const RESCAN_OVERLAP_SECS: i64 = 60;

#[derive(Serialize)]
struct Tick {
    at: DateTime<Utc>,
    merged: usize,
    pruned: usize,
    stats: LedgerStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    burn_rate: Option<BurnRateInfo>,
}

pub async fn run(
    provider: Option<String>,
    log_dir: Option<PathBuf>,
    interval_secs: u64,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let provider = match provider.as_deref() {
        Some(id) => Provider::from_id(id).with_context(|| format!("Unknown provider: '{}'", id))?,
        None => Provider::Claude,
    };
    let Some(dir) = log_dir
        .or_else(|| config.log_dir_for(provider))
        .or_else(|| provider.default_log_dir())
    else {
        bail!(
            "{} has no default log directory; pass --log-dir",
            provider.display_name()
        );
    };
    if interval_secs == 0 {
        bail!("--interval-secs must be positive");
    }

    let ledger_config = config.ledger_config();
    let session_window = config.prediction_options().session_window;
    let ledger = Arc::new(SessionLedger::new(ledger_config.clone()));

    if matches!(opts.format, OutputFormat::Text) {
        eprintln!(
            "Watching {} logs in {} every {}s (Ctrl-C to stop)",
            provider.display_name(),
            dir.display(),
            interval_secs
        );
    }

    let mut since = Utc::now() - ledger_config.window;
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {}
        }

        let scan_started = Utc::now();
        let scan_dir = dir.clone();
        let merge_ledger = Arc::clone(&ledger);
        let merged = tokio::task::spawn_blocking(move || {
            let entries = JsonlScanner.scan(&scan_dir, since)?;
            anyhow::Ok(merge_ledger.merge_log_data(&entries))
        })
        .await?;
        let merged = match merged {
            Ok(n) => {
                since = scan_started - Duration::seconds(RESCAN_OVERLAP_SECS);
                n
            }
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "log scan failed");
                0
            }
        };

        let pruned = ledger.prune();
        debug!(merged, pruned, entries = ledger.len(), "watch tick");
        let tick = Tick {
            at: Utc::now(),
            merged,
            pruned,
            stats: ledger.stats(),
            burn_rate: ledger.burn_rate(session_window),
        };
        print_tick(&tick, provider, opts)?;
    }

    if matches!(opts.format, OutputFormat::Text) {
        eprintln!("Stopped.");
    }
    Ok(())
}

fn print_tick(tick: &Tick, provider: Provider, opts: &OutputOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Text => {
            let header = format!(
                "{} (+{} merged, -{} pruned)",
                tick.at.with_timezone(&Local).format("%H:%M:%S"),
                tick.merged,
                tick.pruned
            );
            let header = if opts.use_color {
                header.dimmed().to_string()
            } else {
                header
            };
            println!(
                "{}\n{}\n{}\n",
                header,
                renderer::render_burn_rate(
                    provider.display_name(),
                    tick.burn_rate.as_ref(),
                    opts.use_color
                ),
                renderer::render_stats(&tick.stats, opts.use_color)
            );
        }
        // One JSON document per line so the stream can be piped
        OutputFormat::Json => {
            let compact = OutputOptions {
                pretty: false,
                ..opts.clone()
            };
            println!("{}", to_json(tick, &compact)?);
        }
    }
    Ok(())
}
