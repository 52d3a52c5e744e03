use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// AI CLI tools whose profiles can be forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Claude,
    Codex,
    Gemini,
}

impl Provider {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "claude" | "claude-code" | "claude_code" => Some(Self::Claude),
            "codex" | "openai" => Some(Self::Codex),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Claude => "Claude",
            Self::Codex => "Codex",
            Self::Gemini => "Gemini",
        }
    }

    /// Default session-log root for the tool, if it writes token usage to disk.
    pub fn default_log_dir(&self) -> Option<PathBuf> {
        match self {
            Self::Claude => {
                if let Ok(config_dir) = std::env::var("CLAUDE_CONFIG_DIR") {
                    return Some(PathBuf::from(config_dir).join("projects"));
                }
                dirs::home_dir().map(|h| h.join(".claude").join("projects"))
            }
            Self::Codex => {
                if let Ok(codex_home) = std::env::var("CODEX_HOME") {
                    return Some(PathBuf::from(codex_home).join("sessions"));
                }
                dirs::home_dir().map(|h| h.join(".codex").join("sessions"))
            }
            Self::Gemini => None,
        }
    }

    /// Command the rotation layer exposes for moving this provider to another profile.
    pub fn rotation_command(&self) -> String {
        format!("ait activate {} --auto", self.id())
    }

    pub fn all() -> &'static [Provider] {
        &[Provider::Claude, Provider::Codex, Provider::Gemini]
    }
}
