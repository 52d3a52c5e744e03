use anyhow::Result;
use serde::Serialize;
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: Option<&str>, fallback: &str) -> Self {
        match value.unwrap_or(fallback) {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

/// `color_setting` is the config value: "always", "never" or "auto".
pub fn detect_color(color_flag: bool, color_setting: &str) -> bool {
    if !color_flag || color_setting == "never" {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    color_setting == "always" || std::io::stdout().is_terminal()
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, opts: &OutputOptions) -> Result<String> {
    let json = if opts.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T, opts: &OutputOptions) -> Result<()> {
    println!("{}", to_json(value, opts)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_falls_back_to_config_default() {
        assert_eq!(OutputFormat::parse(None, "json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(Some("text"), "json"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse(Some("yaml"), "text"), OutputFormat::Text);
    }

    #[test]
    fn color_disabled_by_flag_or_setting() {
        assert!(!detect_color(false, "always"));
        assert!(!detect_color(true, "never"));
    }

    #[test]
    fn json_respects_pretty() {
        let mut opts = OutputOptions {
            format: OutputFormat::Json,
            pretty: false,
            use_color: false,
            verbose: false,
        };
        assert_eq!(to_json(&vec![1, 2], &opts).unwrap(), "[1,2]");
        opts.pretty = true;
        assert!(to_json(&vec![1, 2], &opts).unwrap().contains('\n'));
    }
}
