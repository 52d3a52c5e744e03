use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::core::logs::LogScanner;
use crate::core::models::token::{TokenEntry, TokenSource};

/// Session logs are nested at most this deep (Codex: sessions/YYYY/MM/DD/*.jsonl).
const MAX_DEPTH: u32 = 5;

// ── Claude JSONL structs ──────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonlMessage {
    model: Option<String>,
    usage: Option<JsonlUsage>,
    id: Option<String>,
}

#[derive(Deserialize)]
struct JsonlUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cache_read_input_tokens: Option<u64>,
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct JsonlLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    message: Option<JsonlMessage>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    timestamp: Option<String>,
}

// ── Codex JSONL structs ───────────────────────────────────────────────

#[derive(Deserialize)]
struct CodexLine {
    #[serde(rename = "type")]
    line_type: Option<String>,
    timestamp: Option<String>,
    payload: Option<CodexPayload>,
}

#[derive(Deserialize)]
struct CodexPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    model: Option<String>,
    info: Option<CodexTokenInfo>,
}

#[derive(Deserialize)]
struct CodexTokenInfo {
    last_token_usage: Option<CodexTokenUsage>,
    model_name: Option<String>,
}

#[derive(Deserialize)]
struct CodexTokenUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    cached_input_tokens: Option<u64>,
}

/// Scanner for Claude Code and Codex JSONL session logs.
#[derive(Debug, Clone, Default)]
pub struct JsonlScanner;

impl LogScanner for JsonlScanner {
    fn scan(&self, log_dir: &Path, since: DateTime<Utc>) -> Result<Vec<TokenEntry>> {
        if !log_dir.is_dir() {
            anyhow::bail!("log directory not found: {}", log_dir.display());
        }

        let mut files: Vec<PathBuf> = Vec::new();
        collect_jsonl_recursive(log_dir, &mut files, MAX_DEPTH);

        let mut entries: Vec<TokenEntry> = Vec::new();
        let mut skipped = 0usize;
        for path in &files {
            if modified_before(path, since) {
                skipped += 1;
                continue;
            }
            match parse_file(path) {
                Ok(records) => entries.extend(records.into_iter().filter(|e| e.timestamp >= since)),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable log"),
            }
        }

        entries.sort_by_key(|e| e.timestamp);
        debug!(
            dir = %log_dir.display(),
            files = files.len(),
            skipped,
            entries = entries.len(),
            "scanned session logs"
        );
        Ok(entries)
    }
}

/// Recursively collect *.jsonl files up to `max_depth` levels deep.
fn collect_jsonl_recursive(dir: &Path, files: &mut Vec<PathBuf>, max_depth: u32) {
    if max_depth == 0 {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            files.push(path);
        } else if path.is_dir() {
            collect_jsonl_recursive(&path, files, max_depth - 1);
        }
    }
}

/// Files untouched since `since` cannot hold newer records.
fn modified_before(path: &Path, since: DateTime<Utc>) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t) < since)
        .unwrap_or(false)
}

fn parse_timestamp(ts: Option<&str>) -> Option<DateTime<Utc>> {
    ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fast ASCII check: does this line look like a Claude assistant turn with usage?
fn is_claude_candidate(line: &str) -> bool {
    line.contains("\"type\":\"assistant\"") && line.contains("\"usage\"")
}

fn is_codex_candidate(line: &str) -> bool {
    line.contains("\"token_count\"") || line.contains("\"turn_context\"")
}

/// Parse one session file. Lines from either tool may appear; each is routed by shape.
fn parse_file(path: &Path) -> Result<Vec<TokenEntry>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut entries: Vec<TokenEntry> = Vec::new();
    // Claude streams several chunks per message; the last one carries final usage.
    let mut dedup: HashMap<(String, String), usize> = HashMap::new();
    let mut codex_model: Option<String> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if is_claude_candidate(line) {
            let Some((entry, request_id)) = parse_claude_line(line) else {
                continue;
            };
            let msg_id = entry.message_id.clone().unwrap_or_default();
            let req_id = request_id.unwrap_or_default();
            if msg_id.is_empty() && req_id.is_empty() {
                entries.push(entry);
                continue;
            }
            match dedup.get(&(msg_id.clone(), req_id.clone())) {
                Some(&idx) => entries[idx] = entry,
                None => {
                    dedup.insert((msg_id, req_id), entries.len());
                    entries.push(entry);
                }
            }
        } else if is_codex_candidate(line) {
            if let Some(entry) = parse_codex_line(line, &mut codex_model) {
                entries.push(entry);
            }
        }
    }

    trace!(path = %path.display(), entries = entries.len(), "parsed session log");
    Ok(entries)
}

fn parse_claude_line(line: &str) -> Option<(TokenEntry, Option<String>)> {
    let parsed: JsonlLine = serde_json::from_str(line).ok()?;
    if parsed.line_type.as_deref() != Some("assistant") {
        return None;
    }
    let message = parsed.message?;
    let model = message.model?;
    let usage = message.usage?;
    let timestamp = parse_timestamp(parsed.timestamp.as_deref())?;

    let mut entry = TokenEntry::new(model, TokenSource::LogParse).at(timestamp);
    entry.input_tokens = usage.input_tokens.unwrap_or(0);
    entry.output_tokens = usage.output_tokens.unwrap_or(0);
    entry.cache_read_tokens = usage.cache_read_input_tokens.unwrap_or(0);
    entry.cache_creation_tokens = usage.cache_creation_input_tokens.unwrap_or(0);
    entry.message_id = message.id;
    entry.conversation_id = parsed.session_id;
    Some((entry, parsed.request_id))
}

/// Codex reports per-turn usage in `last_token_usage`; the model comes from the
/// event itself or the most recent `turn_context`.
fn parse_codex_line(line: &str, current_model: &mut Option<String>) -> Option<TokenEntry> {
    let parsed: CodexLine = serde_json::from_str(line).ok()?;
    let payload = parsed.payload?;

    if parsed.line_type.as_deref() == Some("turn_context") {
        if let Some(model) = payload.model {
            *current_model = Some(model);
        }
        return None;
    }
    if parsed.line_type.as_deref() != Some("event_msg")
        || payload.payload_type.as_deref() != Some("token_count")
    {
        return None;
    }

    let info = payload.info?;
    let usage = info.last_token_usage?;
    let timestamp = parse_timestamp(parsed.timestamp.as_deref())?;
    let model = info
        .model_name
        .or_else(|| current_model.clone())
        .unwrap_or_else(|| "unknown-codex".to_string());

    // Codex counts cached input inside input_tokens
    let cached = usage.cached_input_tokens.unwrap_or(0);
    let mut entry = TokenEntry::new(model, TokenSource::LogParse).at(timestamp);
    entry.input_tokens = usage.input_tokens.unwrap_or(0).saturating_sub(cached);
    entry.output_tokens = usage.output_tokens.unwrap_or(0);
    entry.cache_read_tokens = cached;
    Some(entry)
}
