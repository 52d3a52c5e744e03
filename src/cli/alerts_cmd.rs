use anyhow::Result;
use std::path::PathBuf;

use crate::cli::output::{print_json, OutputFormat, OutputOptions};
use crate::cli::{predict_cmd, renderer, snapshots};
use crate::core::config::AppConfig;
use crate::core::forecast::alerts::generate_alerts;
use crate::core::notify::{Notification, Notifier, StderrNotifier};

pub async fn run(
    snapshots_path: Option<PathBuf>,
    notify: bool,
    config: &AppConfig,
    opts: &OutputOptions,
) -> Result<()> {
    let mut loaded = snapshots::load(snapshots_path.as_deref())?;
    snapshots::apply_config(&mut loaded, config);

    let predictions = predict_cmd::forecast(loaded, config).await?;
    let alerts = generate_alerts(&predictions, &config.alert_options());

    match opts.format {
        OutputFormat::Text => {
            if alerts.is_empty() {
                println!("No alerts. All profiles have headroom.");
            } else {
                let sections: Vec<String> = alerts
                    .iter()
                    .map(|a| renderer::render_alert(a, opts.use_color))
                    .collect();
                println!("{}", sections.join("\n\n"));
            }
        }
        OutputFormat::Json => print_json(&alerts, opts)?,
    }

    if notify {
        let notifier = StderrNotifier {
            use_color: opts.use_color,
        };
        for alert in &alerts {
            notifier.notify(&Notification::from(alert))?;
        }
    }
    Ok(())
}
