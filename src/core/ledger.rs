//! Rolling, thread-safe record of token usage for the active profile.
//!
//! Entries and running totals live behind a single lock so readers never see a
//! total that disagrees with the entry buffer. Every accessor returns copies.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::core::forecast::burn_rate::{calculate_at, BurnRateOptions, BurnSample};
use crate::core::models::burn_rate::BurnRateInfo;
use crate::core::models::token::{TokenEntry, TokenSource, TokenTotals};

/// Log entries within this distance of a recorded entry are treated as the same event.
const MERGE_TOLERANCE_MS: i64 = 1_000;

/// Characters per estimated output token for streamed text.
const CHARS_PER_TOKEN: u64 = 4;

pub type Observer = Arc<dyn Fn(&TokenEntry) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Oldest entries are evicted once this many are held
    pub max_entries: usize,
    /// Entries older than this are dropped by `prune`
    pub window: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            window: Duration::hours(5),
        }
    }
}

/// Usage block of an API response, as handed to [`SessionLedger::record_from_response`].
#[derive(Debug, Clone, Default)]
pub struct ResponseUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub entries: usize,
    pub totals: TokenTotals,
    pub total_tokens: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub models: usize,
}

#[derive(Default)]
struct LedgerState {
    entries: VecDeque<TokenEntry>,
    totals: TokenTotals,
    observer: Option<Observer>,
}

impl LedgerState {
    fn push(&mut self, entry: TokenEntry, max_entries: usize) {
        self.totals.add(&entry);
        self.entries.push_back(entry);
        while self.entries.len() > max_entries {
            match self.entries.pop_front() {
                Some(evicted) => self.totals.subtract(&evicted),
                None => break,
            }
        }
    }

    /// Index of the recorded entry a log entry reconciles with, if any.
    fn find_match(&self, log: &TokenEntry, ids: &HashMap<String, usize>) -> Option<usize> {
        if let Some(id) = log.message_id.as_deref() {
            if let Some(&idx) = ids.get(id) {
                return Some(idx);
            }
        }
        self.entries.iter().position(|existing| {
            let ids_conflict = matches!(
                (existing.message_id.as_deref(), log.message_id.as_deref()),
                (Some(a), Some(b)) if a != b
            );
            !ids_conflict
                && (existing.timestamp - log.timestamp).num_milliseconds().abs()
                    <= MERGE_TOLERANCE_MS
        })
    }
}

fn index_message_ids(entries: &VecDeque<TokenEntry>) -> HashMap<String, usize> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| e.message_id.clone().map(|id| (id, idx)))
        .collect()
}

pub struct SessionLedger {
    config: LedgerConfig,
    state: RwLock<LedgerState>,
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl SessionLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register a callback invoked after every `record`.
    ///
    /// The callback runs once the write lock is released but before `record`
    /// returns, so it may read from the ledger.
    pub fn set_observer(&self, observer: impl Fn(&TokenEntry) + Send + Sync + 'static) {
        self.state.write().observer = Some(Arc::new(observer));
    }

    pub fn clear_observer(&self) {
        self.state.write().observer = None;
    }

    /// Append an entry, stamping it with the current time when it has none.
    pub fn record(&self, mut entry: TokenEntry) {
        if !entry.has_timestamp() {
            entry.timestamp = Utc::now();
        }
        trace!(
            model = %entry.model,
            source = %entry.source,
            tokens = entry.total_tokens(),
            "recording usage"
        );

        let observer = {
            let mut state = self.state.write();
            let observer = state.observer.clone();
            let notify = observer.as_ref().map(|_| entry.clone());
            state.push(entry, self.config.max_entries);
            observer.zip(notify)
        };

        if let Some((observer, entry)) = observer {
            observer(&entry);
        }
    }

    /// Record usage reported by an API response.
    pub fn record_from_response(&self, model: &str, usage: ResponseUsage) {
        let mut entry = TokenEntry::new(model, TokenSource::ApiResponse);
        entry.input_tokens = usage.input_tokens;
        entry.output_tokens = usage.output_tokens;
        entry.cache_read_tokens = usage.cache_read_tokens;
        entry.cache_creation_tokens = usage.cache_creation_tokens;
        entry.message_id = usage.message_id;
        entry.conversation_id = usage.conversation_id;
        self.record(entry);
    }

    /// Estimate output tokens for a streamed text chunk and record them.
    ///
    /// Returns the estimate; an empty chunk records nothing.
    pub fn estimate_from_stream(&self, model: &str, chunk: &str) -> u64 {
        if chunk.is_empty() {
            return 0;
        }
        let chars = chunk.chars().count() as u64;
        let tokens = (chars / CHARS_PER_TOKEN).max(1);

        let mut entry = TokenEntry::new(model, TokenSource::StreamEstimate);
        entry.output_tokens = tokens;
        self.record(entry);
        tokens
    }

    /// Burn rate over the trailing `window`, using thresholds suited to live data.
    pub fn burn_rate(&self, window: Duration) -> Option<BurnRateInfo> {
        self.burn_rate_at(window, Utc::now())
    }

    pub fn burn_rate_at(&self, window: Duration, now: DateTime<Utc>) -> Option<BurnRateInfo> {
        let cutoff = now - window;
        let samples: Vec<BurnSample> = {
            let state = self.state.read();
            state
                .entries
                .iter()
                .filter(|e| e.timestamp >= cutoff)
                .map(BurnSample::from)
                .collect()
        };
        calculate_at(&samples, window, &BurnRateOptions::relaxed(), now)
    }

    /// Reconcile historical log records into the ledger.
    ///
    /// Estimated entries matching a log record take its counts and become
    /// `log_parse`. Returns how many log records were appended as new entries.
    pub fn merge_log_data(&self, log_entries: &[TokenEntry]) -> usize {
        let mut state = self.state.write();

        let mut ids = index_message_ids(&state.entries);
        let mut added = 0;
        let mut promoted = 0;
        for log in log_entries {
            match state.find_match(log, &ids) {
                Some(idx) => {
                    if state.entries[idx].source != TokenSource::StreamEstimate {
                        continue;
                    }
                    let previous = state.entries[idx].clone();
                    let existing = &mut state.entries[idx];
                    existing.input_tokens = log.input_tokens;
                    existing.output_tokens = log.output_tokens;
                    existing.cache_read_tokens = log.cache_read_tokens;
                    existing.cache_creation_tokens = log.cache_creation_tokens;
                    existing.source = TokenSource::LogParse;
                    if existing.message_id.is_none() {
                        existing.message_id = log.message_id.clone();
                    }
                    let updated = existing.clone();
                    if let Some(id) = &updated.message_id {
                        ids.insert(id.clone(), idx);
                    }
                    state.totals.subtract(&previous);
                    state.totals.add(&updated);
                    promoted += 1;
                }
                None => {
                    let mut entry = log.clone();
                    entry.source = TokenSource::LogParse;
                    if !entry.has_timestamp() {
                        entry.timestamp = Utc::now();
                    }
                    let evicts = state.entries.len() >= self.config.max_entries;
                    let id = entry.message_id.clone();
                    let idx = state.entries.len();
                    state.push(entry, self.config.max_entries);
                    added += 1;
                    if evicts {
                        // Positions shifted; rebuild the id index.
                        ids = index_message_ids(&state.entries);
                    } else if let Some(id) = id {
                        ids.insert(id, idx);
                    }
                }
            }
        }

        debug!(added, promoted, "merged log data into session ledger");
        added
    }

    /// Drop entries older than the configured window. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.window;
        let mut state = self.state.write();
        let before = state.entries.len();

        let mut kept = VecDeque::with_capacity(before);
        let mut totals = TokenTotals::default();
        for entry in state.entries.drain(..) {
            if entry.timestamp >= cutoff {
                totals.add(&entry);
                kept.push_back(entry);
            }
        }
        state.entries = kept;
        state.totals = totals;

        let pruned = before - state.entries.len();
        if pruned > 0 {
            debug!(pruned, "pruned expired ledger entries");
        }
        pruned
    }

    pub fn total_tokens(&self) -> u64 {
        self.state.read().totals.total()
    }

    pub fn totals(&self) -> TokenTotals {
        self.state.read().totals
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        let models: std::collections::HashSet<&str> =
            state.entries.iter().map(|e| e.model.as_str()).collect();
        LedgerStats {
            entries: state.entries.len(),
            totals: state.totals,
            total_tokens: state.totals.total(),
            oldest: state.entries.iter().map(|e| e.timestamp).min(),
            newest: state.entries.iter().map(|e| e.timestamp).max(),
            models: models.len(),
        }
    }

    /// Token totals per model.
    pub fn by_model(&self) -> BTreeMap<String, TokenTotals> {
        let state = self.state.read();
        let mut map: BTreeMap<String, TokenTotals> = BTreeMap::new();
        for entry in &state.entries {
            map.entry(entry.model.clone()).or_default().add(entry);
        }
        map
    }

    /// Token totals per observation source.
    pub fn by_source(&self) -> BTreeMap<TokenSource, TokenTotals> {
        let state = self.state.read();
        let mut map: BTreeMap<TokenSource, TokenTotals> = BTreeMap::new();
        for entry in &state.entries {
            map.entry(entry.source).or_default().add(entry);
        }
        map
    }

    /// Copy of every held entry, oldest first.
    pub fn snapshot(&self) -> Vec<TokenEntry> {
        self.state.read().entries.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.totals = TokenTotals::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry_at(ts: DateTime<Utc>, tokens: u64, source: TokenSource) -> TokenEntry {
        let mut entry = TokenEntry::new("claude-sonnet-4-5", source).at(ts);
        entry.output_tokens = tokens;
        entry
    }

    #[test]
    fn record_stamps_missing_timestamp() {
        let ledger = SessionLedger::default();
        let before = Utc::now();
        ledger.record(TokenEntry::new("m", TokenSource::ApiResponse));
        let entries = ledger.snapshot();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].timestamp >= before);
    }

    #[test]
    fn record_updates_running_totals() {
        let ledger = SessionLedger::default();
        ledger.record_from_response(
            "claude-opus-4",
            ResponseUsage {
                input_tokens: 100,
                output_tokens: 50,
                cache_read_tokens: 1000,
                cache_creation_tokens: 10,
                message_id: Some("msg_1".into()),
                conversation_id: None,
            },
        );
        let totals = ledger.totals();
        assert_eq!(totals.input, 100);
        assert_eq!(totals.output, 50);
        assert_eq!(totals.cache, 1010);
        assert_eq!(ledger.total_tokens(), 1160);
        assert_eq!(ledger.snapshot()[0].source, TokenSource::ApiResponse);
    }

    #[test]
    fn eviction_keeps_most_recent_and_matching_totals() {
        let ledger = SessionLedger::new(LedgerConfig {
            max_entries: 5,
            window: Duration::hours(5),
        });
        let base = Utc::now();
        for i in 0..12u64 {
            ledger.record(entry_at(base + Duration::seconds(i as i64), i + 1, TokenSource::ApiResponse));
        }
        let entries = ledger.snapshot();
        assert_eq!(entries.len(), 5);
        let kept: Vec<u64> = entries.iter().map(|e| e.output_tokens).collect();
        assert_eq!(kept, vec![8, 9, 10, 11, 12]);
        let expected: u64 = entries.iter().map(|e| e.total_tokens()).sum();
        assert_eq!(ledger.total_tokens(), expected);
    }

    #[test]
    fn stream_estimate_four_chars_per_token() {
        let ledger = SessionLedger::default();
        assert_eq!(ledger.estimate_from_stream("m", "abcdefgh"), 2);
        assert_eq!(ledger.estimate_from_stream("m", "ab"), 1);
        assert_eq!(ledger.estimate_from_stream("m", ""), 0);
        assert_eq!(ledger.len(), 2);
        assert!(ledger
            .snapshot()
            .iter()
            .all(|e| e.source == TokenSource::StreamEstimate));
    }

    #[test]
    fn burn_rate_uses_relaxed_thresholds() {
        let ledger = SessionLedger::default();
        let now = Utc::now();
        ledger.record(entry_at(now - Duration::minutes(2), 600, TokenSource::ApiResponse));
        ledger.record(entry_at(now, 600, TokenSource::ApiResponse));
        let info = ledger.burn_rate_at(Duration::hours(1), now).unwrap();
        assert_eq!(info.sample_size, 2);
        assert!((info.tokens_per_minute - 600.0).abs() < 1e-6);
    }

    #[test]
    fn burn_rate_none_for_single_entry() {
        let ledger = SessionLedger::default();
        ledger.record(entry_at(Utc::now(), 10, TokenSource::ApiResponse));
        assert!(ledger.burn_rate(Duration::hours(1)).is_none());
    }

    #[test]
    fn merge_promotes_stream_estimates() {
        let ledger = SessionLedger::default();
        let ts = Utc::now() - Duration::minutes(3);
        ledger.record(entry_at(ts, 40, TokenSource::StreamEstimate));

        let mut log = entry_at(ts + Duration::milliseconds(400), 250, TokenSource::LogParse);
        log.input_tokens = 1000;
        log.message_id = Some("msg_1".into());

        assert_eq!(ledger.merge_log_data(&[log]), 0);
        let entries = ledger.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, TokenSource::LogParse);
        assert_eq!(entries[0].output_tokens, 250);
        assert_eq!(entries[0].message_id.as_deref(), Some("msg_1"));
        assert_eq!(ledger.total_tokens(), 1250);
    }

    #[test]
    fn merge_is_idempotent() {
        let ledger = SessionLedger::default();
        let base = Utc::now() - Duration::minutes(30);
        let logs: Vec<TokenEntry> = (0..4)
            .map(|i| {
                let mut e = entry_at(base + Duration::minutes(i * 5), 100, TokenSource::LogParse);
                e.message_id = Some(format!("msg_{}", i));
                e
            })
            .collect();
        assert_eq!(ledger.merge_log_data(&logs), 4);
        assert_eq!(ledger.merge_log_data(&logs), 0);
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.total_tokens(), 400);
    }

    #[test]
    fn merge_past_capacity_evicts_and_keeps_totals() {
        let ledger = SessionLedger::new(LedgerConfig {
            max_entries: 3,
            window: Duration::hours(5),
        });
        let base = Utc::now() - Duration::minutes(30);
        let logs: Vec<TokenEntry> = (0..6u64)
            .map(|i| {
                let mut e = entry_at(base + Duration::minutes(i as i64), (i + 1) * 10, TokenSource::LogParse);
                e.message_id = Some(format!("msg_{}", i));
                e
            })
            .collect();

        assert_eq!(ledger.merge_log_data(&logs), 6);
        let entries = ledger.snapshot();
        assert_eq!(entries.len(), 3);
        let kept: Vec<u64> = entries.iter().map(|e| e.output_tokens).collect();
        assert_eq!(kept, vec![40, 50, 60]);
        let expected: u64 = entries.iter().map(|e| e.total_tokens()).sum();
        assert_eq!(ledger.total_tokens(), expected);

        // The rebuilt id index still recognises the retained records
        assert_eq!(ledger.merge_log_data(&logs[3..]), 0);
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.total_tokens(), expected);
    }

    #[test]
    fn merge_without_ids_matches_by_timestamp() {
        let ledger = SessionLedger::default();
        let ts = Utc::now() - Duration::minutes(10);
        ledger.record(entry_at(ts, 10, TokenSource::ApiResponse));

        let near = entry_at(ts + Duration::milliseconds(900), 99, TokenSource::LogParse);
        let far = entry_at(ts + Duration::seconds(5), 99, TokenSource::LogParse);
        assert_eq!(ledger.merge_log_data(&[near, far]), 1);

        let entries = ledger.snapshot();
        assert_eq!(entries.len(), 2);
        // Authoritative API entries are never overwritten
        assert_eq!(entries[0].output_tokens, 10);
        assert_eq!(entries[0].source, TokenSource::ApiResponse);
    }

    #[test]
    fn merge_does_not_match_conflicting_ids() {
        let ledger = SessionLedger::default();
        let ts = Utc::now();
        let mut recorded = entry_at(ts, 10, TokenSource::StreamEstimate);
        recorded.message_id = Some("msg_a".into());
        ledger.record(recorded);

        let mut log = entry_at(ts, 20, TokenSource::LogParse);
        log.message_id = Some("msg_b".into());
        assert_eq!(ledger.merge_log_data(&[log]), 1);
        assert_eq!(ledger.total_tokens(), 30);
    }

    #[test]
    fn prune_drops_old_entries_and_adjusts_totals() {
        let ledger = SessionLedger::new(LedgerConfig {
            max_entries: 100,
            window: Duration::hours(1),
        });
        let now = Utc::now();
        ledger.record(entry_at(now - Duration::hours(3), 500, TokenSource::LogParse));
        ledger.record(entry_at(now - Duration::minutes(90), 500, TokenSource::LogParse));
        ledger.record(entry_at(now - Duration::minutes(10), 7, TokenSource::LogParse));
        assert_eq!(ledger.prune_at(now), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.total_tokens(), 7);
        assert_eq!(ledger.prune_at(now), 0);
    }

    #[test]
    fn breakdowns_by_model_and_source() {
        let ledger = SessionLedger::default();
        let now = Utc::now();
        ledger.record(entry_at(now, 10, TokenSource::ApiResponse));
        let mut other = entry_at(now, 5, TokenSource::StreamEstimate);
        other.model = "gpt-5".into();
        ledger.record(other);

        let by_model = ledger.by_model();
        assert_eq!(by_model["claude-sonnet-4-5"].total(), 10);
        assert_eq!(by_model["gpt-5"].total(), 5);

        let by_source = ledger.by_source();
        assert_eq!(by_source[&TokenSource::ApiResponse].output, 10);
        assert_eq!(by_source[&TokenSource::StreamEstimate].output, 5);

        let stats = ledger.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.models, 2);
        assert_eq!(stats.total_tokens, 15);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.total_tokens(), 0);
    }

    #[test]
    fn observer_sees_recorded_entry() {
        let ledger = Arc::new(SessionLedger::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let observed_ledger = Arc::clone(&ledger);
        let counter = Arc::clone(&seen);
        ledger.set_observer(move |entry| {
            // Reading from inside the callback must not deadlock
            assert!(observed_ledger.total_tokens() >= entry.total_tokens());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ledger.estimate_from_stream("m", "hello world");
        ledger.record(entry_at(Utc::now(), 3, TokenSource::ApiResponse));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        ledger.clear_observer();
        ledger.record(entry_at(Utc::now(), 3, TokenSource::ApiResponse));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_writers_and_readers_agree() {
        let ledger = Arc::new(SessionLedger::new(LedgerConfig {
            max_entries: 100_000,
            window: Duration::hours(5),
        }));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        ledger.record(entry_at(Utc::now(), 2, TokenSource::ApiResponse));
                    }
                })
            })
            .collect();
        let reader = {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let stats = ledger.stats();
                    assert_eq!(stats.total_tokens, stats.entries as u64 * 2);
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(ledger.len(), 2000);
        assert_eq!(ledger.total_tokens(), 4000);
    }
}
