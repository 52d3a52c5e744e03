pub mod scanner;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::core::models::token::TokenEntry;

/// Yields historical token-usage records from a profile's session logs.
pub trait LogScanner: Send + Sync {
    /// Records under `log_dir` with timestamps at or after `since`.
    fn scan(&self, log_dir: &Path, since: DateTime<Utc>) -> Result<Vec<TokenEntry>>;
}
