//! Persisted cache of tool-result summaries, keyed by message position.
//!
//! Summaries are produced elsewhere (a cheap LLM call over an old tool
//! result) and written here so the decay pipeline can swap them in on every
//! later turn without paying for the call again. The file lives next to the
//! session transcript:
//!
//! ```text
//! sessions/
//!   tr-abc123/
//!     session.jsonl
//!     session.summaries.json
//! ```
//!
//! Keys are positions in the full, untruncated transcript at the time the
//! summary was computed. They stay meaningful only while nothing upstream of
//! the decay call reorders or removes earlier messages.
//!
//! Loading never fails: a missing, unreadable or malformed file yields an
//! empty store, which at worst means summaries get recomputed. Saving and
//! clearing surface their I/O errors.
//!
//! `summarizedAt` is read as RFC 3339, or as an ISO-8601 date or date-time
//! without a zone, taken as UTC. It is always written back as RFC 3339.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Suffix that replaces `.jsonl` on the transcript path.
pub const SUMMARY_FILE_SUFFIX: &str = ".summaries.json";

const TRANSCRIPT_EXTENSION: &str = ".jsonl";

/// A cached summary of one tool result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    /// Condensed replacement text.
    pub summary: String,
    /// Estimated tokens of the original tool output.
    pub original_token_estimate: u64,
    /// Estimated tokens of `summary`.
    pub summary_token_estimate: u64,
    /// When the summary was produced.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub summarized_at: DateTime<Utc>,
    /// Model that produced it.
    pub model: String,
}

impl SummaryEntry {
    /// Build an entry stamped with the current time, estimating both token
    /// counts from character length.
    pub fn new(original: &str, summary: impl Into<String>, model: impl Into<String>) -> Self {
        let summary = summary.into();
        Self {
            original_token_estimate: estimate_tokens(original),
            summary_token_estimate: estimate_tokens(&summary),
            summary,
            summarized_at: Utc::now(),
            model: model.into(),
        }
    }

    /// Estimated tokens saved by using the summary instead of the original.
    pub fn tokens_saved(&self) -> u64 {
        self.original_token_estimate
            .saturating_sub(self.summary_token_estimate)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn estimate_tokens(text: &str) -> u64 {
    (text.len() as f64 / DEFAULT_CHARS_PER_TOKEN).ceil() as u64
}

/// Mapping from original message index to its cached summary.
///
/// Serialized as a JSON object whose keys are decimal indices.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct SummaryStore {
    entries: BTreeMap<usize, SummaryEntry>,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&SummaryEntry> {
        self.entries.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// Insert or replace the summary for `index`, returning the previous one.
    pub fn insert(&mut self, index: usize, entry: SummaryEntry) -> Option<SummaryEntry> {
        self.entries.insert(index, entry)
    }

    pub fn remove(&mut self, index: usize) -> Option<SummaryEntry> {
        self.entries.remove(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SummaryEntry)> {
        self.entries.iter().map(|(idx, entry)| (*idx, entry))
    }

    /// Total estimated tokens saved across all entries.
    pub fn tokens_saved(&self) -> u64 {
        self.entries.values().map(SummaryEntry::tokens_saved).sum()
    }

    /// Decode file contents, keeping every well-formed entry.
    ///
    /// Returns an empty store if the text isn't JSON or isn't an object.
    fn from_json_lenient(text: &str, path: &Path) -> Self {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Ignoring unparsable summary store {}: {e}", path.display());
                return Self::default();
            }
        };
        let serde_json::Value::Object(map) = value else {
            warn!(
                "Ignoring summary store {}: top level is not an object",
                path.display()
            );
            return Self::default();
        };

        let mut store = Self::default();
        for (key, raw) in map {
            let Ok(index) = key.parse::<usize>() else {
                warn!("Skipping summary with non-numeric key {key:?} in {}", path.display());
                continue;
            };
            match serde_json::from_value::<SummaryEntry>(raw) {
                Ok(entry) => {
                    store.entries.insert(index, entry);
                }
                Err(e) => {
                    warn!("Skipping malformed summary {index} in {}: {e}", path.display());
                }
            }
        }
        store
    }
}

impl FromIterator<(usize, SummaryEntry)> for SummaryStore {
    fn from_iter<I: IntoIterator<Item = (usize, SummaryEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ── Path convention ────────────────────────────────────────────────

/// Summary store path for a session transcript.
///
/// `session.jsonl` becomes `session.summaries.json` in the same directory.
/// A transcript name without the `.jsonl` extension gets the suffix appended.
pub fn summary_store_path(session_path: &Path) -> PathBuf {
    let file_name = session_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(TRANSCRIPT_EXTENSION)
        .unwrap_or(&file_name);
    session_path.with_file_name(format!("{stem}{SUMMARY_FILE_SUFFIX}"))
}

// ── Load ───────────────────────────────────────────────────────────

/// Load the summary store for a session, or an empty store on any failure.
pub async fn load_summary_store(session_path: &Path) -> SummaryStore {
    let path = summary_store_path(session_path);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => SummaryStore::from_json_lenient(&text, &path),
        Err(e) => {
            log_read_failure(&path, &e);
            SummaryStore::default()
        }
    }
}

/// Blocking variant of [`load_summary_store`] for startup paths that run
/// before an async runtime is available.
pub fn load_summary_store_sync(session_path: &Path) -> SummaryStore {
    let path = summary_store_path(session_path);
    match std::fs::read_to_string(&path) {
        Ok(text) => SummaryStore::from_json_lenient(&text, &path),
        Err(e) => {
            log_read_failure(&path, &e);
            SummaryStore::default()
        }
    }
}

fn log_read_failure(path: &Path, e: &io::Error) {
    if e.kind() == io::ErrorKind::NotFound {
        debug!("No summary store at {}", path.display());
    } else {
        warn!("Failed to read summary store {}: {e}", path.display());
    }
}

// ── Save / clear ───────────────────────────────────────────────────

/// Write the store as pretty-printed JSON, replacing any previous contents.
///
/// Missing parent directories are created. The JSON is written to a hidden
/// temp file in the same directory and renamed into place.
pub async fn save_summary_store(session_path: &Path, store: &SummaryStore) -> io::Result<()> {
    let path = summary_store_path(session_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let json = serde_json::to_string_pretty(store)?;
    let tmp_path = temp_path_for(&path);
    tokio::fs::write(&tmp_path, json).await?;
    tokio::fs::rename(&tmp_path, &path).await?;

    debug!("Saved {} summaries to {}", store.len(), path.display());
    Ok(())
}

/// Delete the store file. Succeeds if it was already absent.
pub async fn clear_summary_store(session_path: &Path) -> io::Result<()> {
    let path = summary_store_path(session_path);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            debug!("Cleared summary store {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(summary: &str, at: &str, model: &str) -> SummaryEntry {
        SummaryEntry {
            summary: summary.into(),
            original_token_estimate: 450,
            summary_token_estimate: 12,
            summarized_at: at.parse().unwrap(),
            model: model.into(),
        }
    }

    fn make_sample_store() -> SummaryStore {
        [
            (
                2,
                entry(
                    "Read file /src/foo.ts, found function bar()",
                    "2026-01-15T10:00:00.000Z",
                    "anthropic/claude-haiku-4-5",
                ),
            ),
            (
                5,
                entry(
                    "Search returned 3 matches in utils.ts",
                    "2026-01-15T10:01:00.000Z",
                    "anthropic/claude-haiku-4-5",
                ),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn session_in(dir: &Path) -> PathBuf {
        dir.join("session.jsonl")
    }

    #[test]
    fn path_replaces_jsonl_extension() {
        assert_eq!(
            summary_store_path(Path::new("/tmp/s/session.jsonl")),
            PathBuf::from("/tmp/s/session.summaries.json")
        );
        assert_eq!(
            summary_store_path(Path::new("transcript")),
            PathBuf::from("transcript.summaries.json")
        );
        assert_eq!(
            summary_store_path(Path::new("a/run.log")),
            PathBuf::from("a/run.log.summaries.json")
        );
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_summary_store(&session_in(dir.path())).await.is_empty());
        assert!(load_summary_store_sync(&session_in(dir.path())).is_empty());
    }

    #[tokio::test]
    async fn invalid_json_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        std::fs::write(summary_store_path(&session), "not json!").unwrap();
        assert!(load_summary_store(&session).await.is_empty());

        std::fs::write(summary_store_path(&session), "{broken").unwrap();
        assert!(load_summary_store_sync(&session).is_empty());
    }

    #[tokio::test]
    async fn non_object_top_level_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        for raw in ["[1,2,3]", "42", "\"text\"", "null"] {
            std::fs::write(summary_store_path(&session), raw).unwrap();
            assert!(load_summary_store(&session).await.is_empty(), "{raw}");
        }
    }

    #[tokio::test]
    async fn loads_file_written_by_other_tooling() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let raw = serde_json::json!({
            "2": {
                "summary": "Read file /src/foo.ts, found function bar()",
                "originalTokenEstimate": 450,
                "summaryTokenEstimate": 12,
                "summarizedAt": "2026-01-15T10:00:00.000Z",
                "model": "anthropic/claude-haiku-4-5"
            },
            "5": {
                "summary": "Search returned 3 matches in utils.ts",
                "originalTokenEstimate": 450,
                "summaryTokenEstimate": 12,
                "summarizedAt": "2026-01-15T10:01:00.000Z",
                "model": "anthropic/claude-haiku-4-5"
            }
        });
        std::fs::write(summary_store_path(&session), raw.to_string()).unwrap();

        assert_eq!(load_summary_store(&session).await, make_sample_store());
        assert_eq!(load_summary_store_sync(&session), make_sample_store());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let raw = r#"{
            "abc": {"summary": "bad key"},
            "3": {"summary": "missing fields"},
            "7": {
                "summary": "ok",
                "originalTokenEstimate": 10,
                "summaryTokenEstimate": 1,
                "summarizedAt": "2026-02-01T00:00:00Z",
                "model": "haiku"
            }
        }"#;
        std::fs::write(summary_store_path(&session), raw).unwrap();

        let store = load_summary_store_sync(&session);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().summary, "ok");
    }

    #[test]
    fn zone_less_timestamps_load_as_utc() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        let entry_at = |at: &str| {
            serde_json::json!({
                "summary": "s",
                "originalTokenEstimate": 10,
                "summaryTokenEstimate": 1,
                "summarizedAt": at,
                "model": "haiku"
            })
        };
        let raw = serde_json::json!({
            "1": entry_at("2026-01-15T10:00:00"),
            "2": entry_at("2026-01-15T10:00:00.250"),
            "3": entry_at("2026-01-15"),
            "4": entry_at("2026-01-15T12:00:00+02:00"),
            "5": entry_at("yesterday")
        });
        std::fs::write(summary_store_path(&session), raw.to_string()).unwrap();

        let store = load_summary_store_sync(&session);
        assert_eq!(store.len(), 4);
        let at = |i: usize| store.get(i).unwrap().summarized_at.to_rfc3339();
        assert_eq!(at(1), "2026-01-15T10:00:00+00:00");
        assert_eq!(at(2), "2026-01-15T10:00:00.250+00:00");
        assert_eq!(at(3), "2026-01-15T00:00:00+00:00");
        assert_eq!(at(4), "2026-01-15T10:00:00+00:00");
        assert!(!store.contains(5));
    }

    #[tokio::test]
    async fn save_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("session.jsonl");
        let sample = make_sample_store();

        save_summary_store(&nested, &sample).await.unwrap();

        assert_eq!(load_summary_store(&nested).await, sample);
        assert!(!temp_path_for(&summary_store_path(&nested)).exists());
    }

    #[tokio::test]
    async fn save_overwrites_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        save_summary_store(&session, &make_sample_store())
            .await
            .unwrap();

        let mut replacement = SummaryStore::new();
        replacement.insert(
            10,
            entry("Updated summary", "2026-02-01T00:00:00.000Z", "haiku"),
        );
        save_summary_store(&session, &replacement).await.unwrap();

        let loaded = load_summary_store(&session).await;
        assert_eq!(loaded, replacement);
        assert!(loaded.get(2).is_none());
    }

    #[tokio::test]
    async fn save_writes_pretty_json_with_decimal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        save_summary_store(&session, &make_sample_store())
            .await
            .unwrap();

        let raw = std::fs::read_to_string(summary_store_path(&session)).unwrap();
        assert!(raw.contains('\n'));
        assert!(raw.contains("  "));
        assert!(raw.contains("\"2\": {"));
        assert!(raw.contains("\"originalTokenEstimate\": 450"));
        assert!(raw.contains("\"summarizedAt\": \"2026-01-15T10:00:00"));
    }

    #[tokio::test]
    async fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());
        save_summary_store(&session, &make_sample_store())
            .await
            .unwrap();
        assert!(summary_store_path(&session).exists());

        clear_summary_store(&session).await.unwrap();

        assert!(!summary_store_path(&session).exists());
        assert!(load_summary_store(&session).await.is_empty());
    }

    #[tokio::test]
    async fn clear_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        clear_summary_store(&session_in(dir.path())).await.unwrap();
    }

    #[test]
    fn new_entry_estimates_tokens() {
        let original = "x".repeat(350);
        let e = SummaryEntry::new(&original, "short", "haiku");
        assert_eq!(e.original_token_estimate, 100);
        assert_eq!(e.summary_token_estimate, 2);
        assert_eq!(e.tokens_saved(), 98);
        assert_eq!(e.model, "haiku");

        let store: SummaryStore = [(1, e.clone()), (4, e)].into_iter().collect();
        assert_eq!(store.tokens_saved(), 196);
        assert_eq!(store.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 4]);
    }
}
