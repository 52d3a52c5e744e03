use anyhow::{bail, Context, Result};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

use crate::core::config::AppConfig;
use crate::core::models::usage::ProfileSnapshot;

/// Read a JSON array of snapshots from `path`, or stdin for `-` / no path.
pub fn load(path: Option<&Path>) -> Result<Vec<ProfileSnapshot>> {
    let content = match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("Failed to read snapshots from {}", p.display()))?,
        _ => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                bail!("No snapshots given. Pass --snapshots FILE or pipe JSON on stdin.");
            }
            let mut buf = String::new();
            stdin
                .lock()
                .read_to_string(&mut buf)
                .context("Failed to read snapshots from stdin")?;
            buf
        }
    };
    parse(&content)
}

pub fn parse(content: &str) -> Result<Vec<ProfileSnapshot>> {
    serde_json::from_str(content).context("Snapshots must be a JSON array of profile snapshots")
}

/// Fill in configured log directories for snapshots that carry none.
pub fn apply_config(snapshots: &mut [ProfileSnapshot], config: &AppConfig) {
    for snapshot in snapshots.iter_mut() {
        if snapshot.log_dir.is_some() {
            continue;
        }
        let dir: Option<PathBuf> = snapshot.provider().and_then(|p| config.log_dir_for(p));
        snapshot.log_dir = dir;
    }
}

/// Keep only the named profile; errors when it is not present.
pub fn select_profile(
    snapshots: Vec<ProfileSnapshot>,
    profile: Option<&str>,
) -> Result<Vec<ProfileSnapshot>> {
    let Some(name) = profile else {
        return Ok(snapshots);
    };
    let selected: Vec<ProfileSnapshot> =
        snapshots.into_iter().filter(|s| s.profile == name).collect();
    if selected.is_empty() {
        bail!("Profile '{}' not found in snapshots", name);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderConfig;

    const SNAPSHOTS: &str = r#"[
        {"profile": "work", "provider": "claude", "active": true,
         "usage": {"primary": {"utilization": 0.6, "used_percent": 60}}},
        {"profile": "side", "provider": "codex", "log_dir": "/data/side"}
    ]"#;

    #[test]
    fn parse_snapshot_array() {
        let snapshots = parse(SNAPSHOTS).unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].active);
        assert!(snapshots[1].usage.is_none());
        assert!(parse("{}").is_err());
    }

    #[test]
    fn oversized_window_is_rejected_not_fatal() {
        let result = parse(
            r#"[{"profile": "w", "provider": "claude",
                 "usage": {"primary": {"used_percent": 50, "window": 9223372036854775807}}}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn config_log_dir_does_not_override_snapshot() {
        let mut snapshots = parse(SNAPSHOTS).unwrap();
        let mut config = AppConfig::default();
        config.providers = vec![
            ProviderConfig {
                id: "claude".into(),
                token_limit: None,
                log_dir: Some("/data/claude".into()),
            },
            ProviderConfig {
                id: "codex".into(),
                token_limit: None,
                log_dir: Some("/data/codex".into()),
            },
        ];
        apply_config(&mut snapshots, &config);
        assert_eq!(snapshots[0].log_dir, Some(PathBuf::from("/data/claude")));
        assert_eq!(snapshots[1].log_dir, Some(PathBuf::from("/data/side")));
    }

    #[test]
    fn select_missing_profile_errors() {
        let snapshots = parse(SNAPSHOTS).unwrap();
        assert_eq!(select_profile(snapshots.clone(), Some("side")).unwrap().len(), 1);
        assert_eq!(select_profile(snapshots.clone(), None).unwrap().len(), 2);
        assert!(select_profile(snapshots, Some("nope")).is_err());
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("ait_snapshots_{}.json", std::process::id()));
        std::fs::write(&path, SNAPSHOTS).unwrap();
        let snapshots = load(Some(&path)).unwrap();
        assert_eq!(snapshots[0].profile, "work");
        let _ = std::fs::remove_file(&path);
        assert!(load(Some(Path::new("/definitely/missing.json"))).is_err());
    }
}
