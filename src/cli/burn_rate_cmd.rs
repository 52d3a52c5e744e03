use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{print_json, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::{minutes_in_range, AppConfig, MAX_MINUTES};
use crate::core::forecast::burn_rate::{calculate_at, BurnRateOptions, BurnSample};
use crate::core::logs::scanner::JsonlScanner;
use crate::core::logs::LogScanner;
use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::providers::Provider;

/// Limit window assumed for `--token-limit` when the provider does not say.
const DEFAULT_LIMIT_WINDOW_HOURS: i64 = 5;

#[derive(Serialize)]
struct BurnRatePayload {
    provider: Provider,
    log_dir: PathBuf,
    entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    burn_rate: Option<BurnRateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Providers to report on: the filter, or every configured provider with a log root.
fn resolve_providers(filter: Option<&str>, config: &AppConfig) -> Result<Vec<Provider>> {
    if let Some(id) = filter {
        return match Provider::from_id(id) {
            Some(p) => Ok(vec![p]),
            None => bail!("Unknown provider: '{}'", id),
        };
    }
    let mut providers: Vec<Provider> = config
        .providers
        .iter()
        .filter_map(|p| Provider::from_id(&p.id))
        .collect();
    providers.dedup();
    if providers.is_empty() {
        providers = Provider::all().to_vec();
    }
    Ok(providers)
}

fn burn_rate_options(
    provider: Provider,
    token_limit: Option<u64>,
    config: &AppConfig,
) -> BurnRateOptions {
    let options = config.burn_rate_options();
    let limit = token_limit.or_else(|| config.provider(provider).and_then(|p| p.token_limit));
    match limit {
        Some(limit) if limit > 0 => {
            options.with_limit(limit, Duration::hours(DEFAULT_LIMIT_WINDOW_HOURS))
        }
        _ => options,
    }
}

pub async fn run(
    provider_filter: Option<String>,
    log_dir: Option<PathBuf>,
    window_minutes: Option<i64>,
    token_limit: Option<u64>,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let window = match window_minutes {
        Some(m) => match minutes_in_range(m) {
            Some(window) => window,
            None => bail!(
                "--window-minutes must be between 1 and {} (got {})",
                MAX_MINUTES,
                m
            ),
        },
        None => config.prediction_options().lookback,
    };
    let providers = resolve_providers(provider_filter.as_deref(), config)?;

    let mut payloads: Vec<BurnRatePayload> = Vec::new();
    for provider in providers {
        let Some(dir) = log_dir
            .clone()
            .or_else(|| config.log_dir_for(provider))
            .or_else(|| provider.default_log_dir())
        else {
            tracing::debug!(provider = provider.id(), "no log directory, skipping");
            continue;
        };

        let options = burn_rate_options(provider, token_limit, config);
        let scan_dir = dir.clone();
        let report = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            let entries = JsonlScanner.scan(&scan_dir, now - window)?;
            let samples: Vec<BurnSample> = entries.iter().map(BurnSample::from).collect();
            let rate = calculate_at(&samples, window, &options, now);
            anyhow::Ok((entries.len(), rate))
        })
        .await?;

        payloads.push(match report {
            Ok((entries, burn_rate)) => BurnRatePayload {
                provider,
                log_dir: dir,
                entries,
                burn_rate,
                error: None,
            },
            Err(e) => BurnRatePayload {
                provider,
                log_dir: dir,
                entries: 0,
                burn_rate: None,
                error: Some(format!("{:#}", e)),
            },
        });
    }

    if payloads.is_empty() {
        eprintln!("No provider log directories found. Pass --log-dir to point at session logs.");
        return Ok(());
    }

    match opts.format {
        OutputFormat::Text => {
            let sections: Vec<String> = payloads
                .iter()
                .map(|p| match &p.error {
                    Some(err) => format!(" {} (error)\n  {}", p.provider.display_name(), err),
                    None => renderer::render_burn_rate(
                        p.provider.display_name(),
                        p.burn_rate.as_ref(),
                        opts.use_color,
                    ),
                })
                .collect();
            println!("{}", sections.join("\n\n"));
        }
        OutputFormat::Json => print_json(&payloads, opts)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderConfig;

    #[test]
    fn providers_follow_filter_then_config() {
        let config = AppConfig::default();
        assert_eq!(
            resolve_providers(Some("openai"), &config).unwrap(),
            vec![Provider::Codex]
        );
        assert!(resolve_providers(Some("nope"), &config).is_err());
        assert_eq!(
            resolve_providers(None, &config).unwrap(),
            vec![Provider::Claude, Provider::Codex]
        );
    }

    #[test]
    fn token_limit_flag_beats_config() {
        let mut config = AppConfig::default();
        config.providers = vec![ProviderConfig {
            id: "claude".into(),
            token_limit: Some(1_000),
            log_dir: None,
        }];
        let from_config = burn_rate_options(Provider::Claude, None, &config);
        assert_eq!(from_config.token_limit, Some(1_000));
        assert_eq!(from_config.limit_window, Some(Duration::hours(5)));

        let from_flag = burn_rate_options(Provider::Claude, Some(2_000), &config);
        assert_eq!(from_flag.token_limit, Some(2_000));

        let none = burn_rate_options(Provider::Codex, None, &config);
        assert_eq!(none.token_limit, None);
    }
}
