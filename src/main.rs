use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ait_forecast::cli;
use ait_forecast::cli::output::{detect_color, OutputFormat, OutputOptions};
use ait_forecast::core::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "ait",
    about = "Burn-rate and depletion forecasting for AI CLI profiles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast when each profile will hit its usage limit
    Predict {
        /// JSON array of profile snapshots ("-" for stdin)
        #[arg(short, long)]
        snapshots: Option<PathBuf>,

        /// Only forecast this profile
        #[arg(long)]
        profile: Option<String>,

        /// Only show profiles at or above this warning (approaching|imminent)
        #[arg(long)]
        warning: Option<String>,
    },
    /// Show alerts derived from the forecasts
    Alerts {
        /// JSON array of profile snapshots ("-" for stdin)
        #[arg(short, long)]
        snapshots: Option<PathBuf>,

        /// Also send each alert as a notification
        #[arg(long)]
        notify: bool,
    },
    /// Compute the current burn rate from local session logs
    BurnRate {
        /// Provider to scan (default: all configured)
        #[arg(short, long)]
        provider: Option<String>,

        /// Session log directory to scan
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Trailing window in minutes (default: prediction.lookback_minutes)
        #[arg(long)]
        window_minutes: Option<i64>,

        /// Token budget of the limit window, for percent-per-hour figures
        #[arg(long)]
        token_limit: Option<u64>,
    },
    /// Follow session logs and report the live burn rate until Ctrl-C
    Watch {
        /// Provider whose logs to follow (default: claude)
        #[arg(short, long)]
        provider: Option<String>,

        /// Session log directory to follow
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Seconds between log merges
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the effective config
    Show,
}

/// `RUST_LOG` wins; otherwise `--verbose` selects debug and the default is warn.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "warn" })
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = match AppConfig::load_from(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %config_path.display(), error = %e, "using default config");
            AppConfig::default()
        }
    };

    let output_opts = OutputOptions {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::parse(cli.format.as_deref(), &config.settings.default_format)
        },
        pretty: cli.pretty,
        use_color: detect_color(!cli.no_color, &config.settings.color),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Predict {
            snapshots,
            profile,
            warning,
        } => cli::predict_cmd::run(snapshots, profile, warning, &config, &output_opts).await?,
        Commands::Alerts { snapshots, notify } => {
            cli::alerts_cmd::run(snapshots, notify, &config, &output_opts).await?
        }
        Commands::BurnRate {
            provider,
            log_dir,
            window_minutes,
            token_limit,
        } => {
            cli::burn_rate_cmd::run(
                provider,
                log_dir,
                window_minutes,
                token_limit,
                &config,
                &output_opts,
            )
            .await?
        }
        Commands::Watch {
            provider,
            log_dir,
            interval_secs,
        } => cli::watch_cmd::run(provider, log_dir, interval_secs, &config, &output_opts).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => cli::config_cmd::init(&config_path, &output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&config_path, &output_opts)?,
            ConfigAction::Show => cli::config_cmd::show(&config, &config_path, &output_opts)?,
        },
    }

    Ok(())
}
