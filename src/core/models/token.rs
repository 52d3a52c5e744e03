use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a token-usage observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Parsed from an API response's usage block
    ApiResponse,
    /// Read back from on-disk session logs
    LogParse,
    /// Estimated from streamed output text
    StreamEstimate,
}

impl TokenSource {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ApiResponse => "api_response",
            Self::LogParse => "log_parse",
            Self::StreamEstimate => "stream_estimate",
        }
    }
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One token-consumption event.
///
/// A timestamp equal to the Unix epoch (the `Default`) means "not stamped yet";
/// the session ledger stamps such entries when they are recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    pub source: TokenSource,
}

impl TokenEntry {
    pub fn new(model: impl Into<String>, source: TokenSource) -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            model: model.into(),
            conversation_id: None,
            message_id: None,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            source,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp != DateTime::<Utc>::default()
    }

    pub fn cache_tokens(&self) -> u64 {
        self.cache_read_tokens + self.cache_creation_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_tokens()
    }
}

/// Running input/output/cache totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache: u64,
}

impl TokenTotals {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache
    }

    pub fn add(&mut self, entry: &TokenEntry) {
        self.input += entry.input_tokens;
        self.output += entry.output_tokens;
        self.cache += entry.cache_tokens();
    }

    pub fn subtract(&mut self, entry: &TokenEntry) {
        self.input = self.input.saturating_sub(entry.input_tokens);
        self.output = self.output.saturating_sub(entry.output_tokens);
        self.cache = self.cache.saturating_sub(entry.cache_tokens());
    }
}
