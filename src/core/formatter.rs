use chrono::{DateTime, Duration, Utc};

/// Returns "2d 3h", "2h 15m", "45m" or "<1m". Negative durations read as "0m".
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds();
    if total_seconds <= 0 {
        return "0m".to_string();
    }
    if total_seconds < 60 {
        return "<1m".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("{}d", days)
        } else {
            format!("{}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", total_minutes)
    }
}

/// Returns "Resets in Xh Ym" relative to `now`, or "Resets now" once past.
pub fn format_reset_countdown(resets_at: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = *resets_at - now;
    if remaining.num_seconds() <= 0 {
        return "Resets now".to_string();
    }
    format!("Resets in {}", format_duration(remaining))
}

/// Returns "[████████░░░░]" where █ = remaining portion, ░ = used portion.
pub fn format_usage_bar(used_percent: f64, width: usize) -> String {
    let used_percent = used_percent.clamp(0.0, 100.0);
    let used_blocks = ((used_percent / 100.0) * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    format!("[{}{}]", "█".repeat(remaining_blocks), "░".repeat(used_blocks))
}

pub fn format_tokens(count: f64) -> String {
    if count >= 1_000_000.0 {
        format!("{:.1}M", count / 1_000_000.0)
    } else if count >= 1_000.0 {
        format!("{:.1}K", count / 1_000.0)
    } else {
        format!("{:.0}", count)
    }
}

/// Returns "12.5K tok/h (18.2%/h)", omitting the percent when unknown.
pub fn format_rate(tokens_per_hour: f64, percent_per_hour: f64) -> String {
    let tokens = format!("{} tok/h", format_tokens(tokens_per_hour));
    if percent_per_hour > 0.0 {
        format!("{} ({:.1}%/h)", tokens, percent_per_hour)
    } else {
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::seconds(-5)), "0m");
        assert_eq!(format_duration(Duration::seconds(30)), "<1m");
        assert_eq!(format_duration(Duration::minutes(45)), "45m");
        assert_eq!(format_duration(Duration::minutes(135)), "2h 15m");
        assert_eq!(format_duration(Duration::hours(48)), "2d");
        assert_eq!(format_duration(Duration::hours(27)), "1d 3h");
    }

    #[test]
    fn format_reset_countdown_relative() {
        let now = Utc::now();
        assert_eq!(
            format_reset_countdown(&(now - Duration::seconds(10)), now),
            "Resets now"
        );
        assert_eq!(
            format_reset_countdown(&(now + Duration::minutes(135)), now),
            "Resets in 2h 15m"
        );
    }

    #[test]
    fn format_usage_bar_width() {
        assert_eq!(format_usage_bar(0.0, 12), "[████████████]");
        assert_eq!(format_usage_bar(100.0, 12), "[░░░░░░░░░░░░]");
        assert_eq!(format_usage_bar(50.0, 12), "[██████░░░░░░]");
        assert_eq!(format_usage_bar(140.0, 4), "[░░░░]");
    }

    #[test]
    fn format_rate_with_and_without_percent() {
        assert_eq!(format_rate(12_500.0, 18.24), "12.5K tok/h (18.2%/h)");
        assert_eq!(format_rate(950.0, 0.0), "950 tok/h");
        assert_eq!(format_tokens(2_500_000.0), "2.5M");
    }
}
