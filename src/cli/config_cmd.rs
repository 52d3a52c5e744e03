use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{print_json, OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

pub fn init(path: &Path, _opts: &OutputOptions) -> Result<()> {
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let config = AppConfig::default();
    config
        .save_to(path)
        .with_context(|| format!("Failed to generate config at {}", path.display()))?;

    println!("Generated config at {}", path.display());
    let ids: Vec<&str> = config.providers.iter().map(|p| p.id.as_str()).collect();
    println!(
        "  {} provider{} configured: {}",
        ids.len(),
        if ids.len() == 1 { "" } else { "s" },
        ids.join(", ")
    );
    println!("  Set token_limit per provider to get percent-based burn rates from logs.");
    Ok(())
}

pub fn check(path: &Path, _opts: &OutputOptions) -> Result<()> {
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `ait config init` to create one.");
        return Ok(());
    }

    let config = match AppConfig::load_from(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let issues = config.validate();
    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        let limits: Vec<String> = config
            .providers
            .iter()
            .map(|p| match p.token_limit {
                Some(limit) => format!("{} ({} tokens)", p.id, limit),
                None => p.id.clone(),
            })
            .collect();
        if limits.is_empty() {
            println!("  No providers configured.");
        } else {
            println!("  Providers: {}", limits.join(", "));
        }
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Print the effective config, defaults included.
pub fn show(config: &AppConfig, path: &Path, opts: &OutputOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Text => {
            let source = if path.exists() {
                path.display().to_string()
            } else {
                "built-in defaults".to_string()
            };
            println!("# {}", source);
            print!("{}", toml::to_string_pretty(config)?);
        }
        OutputFormat::Json => print_json(config, opts)?,
    }
    Ok(())
}
