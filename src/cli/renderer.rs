use chrono::{DateTime, Local, Utc};
use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{
    format_duration, format_rate, format_reset_countdown, format_tokens, format_usage_bar,
};
use crate::core::ledger::LedgerStats;
use crate::core::models::alert::{Alert, Urgency};
use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::models::prediction::{Prediction, WarningLevel};

const BAR_WIDTH: usize = 12;

/// Render one profile's forecast.
///
/// Layout:
/// ```text
///  work (Claude)
///   Usage     72% used [███░░░░░░░░░]  primary
///   Burn      12.5K tok/h (18.2%/h)
///   Limit     in 1h 32m (approaching)
///             Resets in 2h 15m
///   Sources   session, logs · confidence 78%
/// ```
pub fn render_prediction(prediction: &Prediction, now: DateTime<Utc>, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    let header = match prediction.provider {
        Some(provider) => format!(" {} ({})", prediction.profile, provider.display_name()),
        None => format!(" {}", prediction.profile),
    };
    lines.push(header.bold().to_string());

    if let Some(err) = &prediction.error {
        lines.push(format!("  {}     {}", "Error".cyan(), err.red()));
        if prediction.current_percent <= 0.0 {
            return lines.join("\n");
        }
    }

    let percent = format!("{:.0}% used", prediction.current_percent);
    let window = prediction.window.as_deref().unwrap_or_default();
    lines.push(format!(
        "  {}     {} {}  {}",
        "Usage".cyan(),
        color_by_used(prediction.current_percent, &percent),
        format_usage_bar(prediction.current_percent, BAR_WIDTH).magenta(),
        window.dimmed()
    ));

    if let Some(rate) = &prediction.burn_rate {
        lines.push(format!(
            "  {}      {}",
            "Burn".cyan(),
            format_rate(rate.tokens_per_hour, rate.percent_per_hour)
        ));
    }

    if prediction.time_to_depletion > chrono::Duration::zero() {
        let eta = format!("in {}", format_duration(prediction.time_to_depletion));
        let suffix = match prediction.warning {
            WarningLevel::None => String::new(),
            level => format!(" ({})", level),
        };
        lines.push(format!(
            "  {}     {}",
            "Limit".cyan(),
            color_by_warning(prediction.warning, &format!("{}{}", eta, suffix))
        ));
    }
    if let Some(resets_at) = &prediction.resets_at {
        lines.push(format!(
            "            {}",
            format_reset_countdown(resets_at, now).dimmed()
        ));
    }

    if !prediction.data_sources.is_empty() {
        lines.push(format!(
            "  {}   {} · confidence {:.0}%",
            "Sources".cyan(),
            prediction.data_sources.join(", "),
            prediction.confidence * 100.0
        ));
    }

    lines.join("\n")
}

pub fn render_alert(alert: &Alert, use_color: bool) -> String {
    control::set_override(use_color);

    let tag = format!("[{}]", alert.urgency);
    let tag = match alert.urgency {
        Urgency::High => tag.red().bold(),
        Urgency::Medium => tag.yellow().bold(),
        Urgency::Low => tag.cyan(),
    };
    let mut lines = vec![
        format!("{} {}", tag, alert.alert_type.title().bold()),
        format!("  {}", alert.message),
        format!("  {} {}", "→".dimmed(), alert.suggested_action),
    ];
    if alert.time_until > chrono::Duration::zero() {
        lines.push(format!(
            "  {}",
            format!("within {}", format_duration(alert.time_until)).dimmed()
        ));
    }
    lines.join("\n")
}

pub fn render_burn_rate(label: &str, rate: Option<&BurnRateInfo>, use_color: bool) -> String {
    control::set_override(use_color);

    let mut lines = vec![format!(" {}", label).bold().to_string()];
    let Some(rate) = rate else {
        lines.push(format!(
            "  {}",
            "Not enough recent activity to compute a burn rate".dimmed()
        ));
        return lines.join("\n");
    };

    lines.push(format!(
        "  {}      {}",
        "Rate".cyan(),
        format_rate(rate.tokens_per_hour, rate.percent_per_hour)
    ));
    lines.push(format!(
        "  {}    {} tokens over {} ({} samples, confidence {:.0}%)",
        "Window".cyan(),
        format_tokens(rate.total_tokens as f64),
        format_duration(rate.window),
        rate.sample_size,
        rate.confidence * 100.0
    ));
    if !rate.by_model.is_empty() {
        lines.push(format!("  {}:", "By Model".cyan()));
        for (model, m) in &rate.by_model {
            lines.push(format!(
                "    {:<28} {}",
                model,
                format_rate(m.tokens_per_hour, m.percent_per_hour)
            ));
        }
    }
    lines.join("\n")
}

pub fn render_stats(stats: &LedgerStats, use_color: bool) -> String {
    control::set_override(use_color);

    let span = match (stats.oldest, stats.newest) {
        (Some(oldest), Some(newest)) => format!(
            "{} – {}",
            oldest.with_timezone(&Local).format("%H:%M"),
            newest.with_timezone(&Local).format("%H:%M")
        ),
        _ => "empty".to_string(),
    };
    format!(
        "  {}    {} entries, {} tokens ({} in / {} out / {} cache), {} models, {}",
        "Ledger".cyan(),
        stats.entries,
        format_tokens(stats.total_tokens as f64),
        format_tokens(stats.totals.input as f64),
        format_tokens(stats.totals.output as f64),
        format_tokens(stats.totals.cache as f64),
        stats.models,
        span
    )
}

fn color_by_used(used_percent: f64, text: &str) -> ColoredString {
    let remaining = 100.0 - used_percent;
    if remaining >= 25.0 {
        text.green()
    } else if remaining >= 10.0 {
        text.yellow()
    } else {
        text.red()
    }
}

fn color_by_warning(level: WarningLevel, text: &str) -> ColoredString {
    match level {
        WarningLevel::Imminent => text.red(),
        WarningLevel::Approaching => text.yellow(),
        WarningLevel::None => text.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::alert::AlertType;
    use crate::core::models::token::TokenTotals;
    use crate::core::providers::Provider;
    use chrono::Duration;

    fn make_prediction() -> Prediction {
        let mut p = Prediction::new("work", Some(Provider::Claude));
        p.window = Some("primary".into());
        p.current_percent = 72.0;
        p.time_to_depletion = Duration::minutes(92);
        p.warning = WarningLevel::None;
        p.confidence = 0.78;
        p.data_sources = vec!["session".into(), "logs".into()];
        p
    }

    #[test]
    fn render_prediction_contains_fields() {
        let now = Utc::now();
        let mut p = make_prediction();
        p.resets_at = Some(now + Duration::minutes(135));
        let output = render_prediction(&p, now, false);
        assert!(output.contains("work (Claude)"));
        assert!(output.contains("72% used"));
        assert!(output.contains("in 1h 32m"));
        assert!(output.contains("Resets in 2h 15m"));
        assert!(output.contains("session, logs · confidence 78%"));
    }

    #[test]
    fn render_prediction_error_only() {
        let p = Prediction::new("idle", None)
            .failed(crate::core::models::prediction::PredictionError::NoUsageData);
        let output = render_prediction(&p, Utc::now(), false);
        assert!(output.contains("no usage data"));
        assert!(!output.contains("Usage"));
    }

    #[test]
    fn render_alert_lines() {
        let alert = Alert {
            alert_type: AlertType::SwitchRecommended,
            urgency: Urgency::High,
            message: "Rotation recommended based on burn rate".into(),
            suggested_action: "Rotate off 'work'".into(),
            time_until: Duration::minutes(20),
            profile: Some("work".into()),
            provider: Some(Provider::Claude),
            prediction: None,
        };
        let output = render_alert(&alert, false);
        assert!(output.starts_with("[high] Profile rotation recommended"));
        assert!(output.contains("within 20m"));
    }

    #[test]
    fn render_burn_rate_without_data() {
        let output = render_burn_rate("Claude", None, false);
        assert!(output.contains("Not enough recent activity"));
    }

    #[test]
    fn render_stats_empty_ledger() {
        let stats = LedgerStats {
            entries: 0,
            totals: TokenTotals::default(),
            total_tokens: 0,
            oldest: None,
            newest: None,
            models: 0,
        };
        let output = render_stats(&stats, false);
        assert!(output.contains("0 entries"));
        assert!(output.contains("empty"));
    }

    #[test]
    fn render_no_ansi_when_color_false() {
        let output = render_prediction(&make_prediction(), Utc::now(), false);
        assert!(!output.contains('\x1b'), "output should not contain ANSI codes");
    }
}
