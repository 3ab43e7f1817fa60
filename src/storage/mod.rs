use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Result, ScrapingError};

/// One stored snippet, unique on `(keyword, dedup_key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRecord {
    pub keyword: String,
    pub text: String,
    pub dedup_key: String,
    pub relevant: bool,
    pub inserted_at: DateTime<Utc>,
    #[serde(default)]
    pub seq: u64,
}

/// Shape returned to API callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TweetRecord {
    pub keyword: String,
    pub text: String,
    pub relevant: bool,
    pub inserted_at: String,
}

impl From<&PersistedRecord> for TweetRecord {
    fn from(record: &PersistedRecord) -> Self {
        Self {
            keyword: record.keyword.clone(),
            text: record.text.clone(),
            relevant: record.relevant,
            inserted_at: record.inserted_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub keyword: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub relevant_only: bool,
    pub ignore_case: bool,
    pub limit: usize,
}

impl RecordQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn relevant_only(mut self) -> Self {
        self.relevant_only = true;
        self
    }

    /// Match keyword filters case-insensitively.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    fn keyword_eq(&self, wanted: &str, actual: &str) -> bool {
        if self.ignore_case {
            wanted.to_lowercase() == actual.to_lowercase()
        } else {
            wanted == actual
        }
    }

    fn matches(&self, record: &PersistedRecord) -> bool {
        if self.relevant_only && !record.relevant {
            return false;
        }
        match (&self.keyword, &self.keywords) {
            (Some(keyword), _) => self.keyword_eq(keyword, &record.keyword),
            (None, Some(keywords)) if !keywords.is_empty() => {
                keywords.iter().any(|keyword| self.keyword_eq(keyword, &record.keyword))
            }
            _ => true,
        }
    }
}

/// Dedup-aware record store. Implementations never raise into the caller:
/// failures are logged and reported as `false` or an empty result.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn upsert_record(&self, keyword: &str, text: &str, relevant: bool) -> bool;
    async fn fetch_records(&self, query: &RecordQuery) -> Vec<PersistedRecord>;
    async fn update_relevance(&self, keyword: &str, text: &str, relevant: bool) -> bool;
}

pub fn dedup_key(keyword: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(keyword.as_bytes());
    hasher.update(b"|");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct StoreState {
    records: HashMap<(String, String), PersistedRecord>,
    file: Option<File>,
    next_seq: u64,
}

/// Append-only JSON-lines store with an in-memory index.
///
/// Every write that changes a record appends its full current state. On open the
/// log is folded, so the first line for a key fixes `inserted_at` and the last one
/// wins for `relevant`, then compacted to one line per record.
pub struct FileRecordStore {
    path: PathBuf,
    enabled: AtomicBool,
    state: Mutex<StoreState>,
}

impl FileRecordStore {
    /// Open the store, falling back to a disabled adapter when the location is unusable.
    pub fn open(directory: &Path, file_name: &str) -> Self {
        let path = directory.join(file_name);
        match Self::try_open(directory, &path) {
            Ok((records, file, next_seq)) => {
                info!("Record store ready at {} ({} records)", path.display(), records.len());
                Self {
                    path,
                    enabled: AtomicBool::new(true),
                    state: Mutex::new(StoreState {
                        records,
                        file: Some(file),
                        next_seq,
                    }),
                }
            }
            Err(e) => {
                error!("Record store unavailable at {}: {}", path.display(), e);
                Self::disabled_at(path)
            }
        }
    }

    pub fn disabled() -> Self {
        Self::disabled_at(PathBuf::new())
    }

    fn disabled_at(path: PathBuf) -> Self {
        Self {
            path,
            enabled: AtomicBool::new(false),
            state: Mutex::new(StoreState {
                records: HashMap::new(),
                file: None,
                next_seq: 0,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_open(
        directory: &Path,
        path: &Path,
    ) -> Result<(HashMap<(String, String), PersistedRecord>, File, u64)> {
        fs::create_dir_all(directory)
            .map_err(|e| ScrapingError::StorageError(format!("Failed to create directory: {}", e)))?;

        let mut records: HashMap<(String, String), PersistedRecord> = HashMap::new();
        let mut next_seq = 0;
        let mut lines = 0usize;

        if path.exists() {
            let reader = BufReader::new(
                File::open(path)
                    .map_err(|e| ScrapingError::StorageError(format!("Failed to open file: {}", e)))?,
            );
            for (line_no, line) in reader.lines().enumerate() {
                let line = line.map_err(|e| ScrapingError::StorageError(format!("Failed to read file: {}", e)))?;
                if line.trim().is_empty() {
                    continue;
                }
                lines += 1;
                match serde_json::from_str::<PersistedRecord>(&line) {
                    Ok(record) => {
                        next_seq = next_seq.max(record.seq + 1);
                        let key = (record.keyword.clone(), record.dedup_key.clone());
                        match records.get_mut(&key) {
                            Some(existing) => existing.relevant = record.relevant,
                            None => {
                                records.insert(key, record);
                            }
                        }
                    }
                    Err(e) => warn!("Skipping malformed record on line {}: {}", line_no + 1, e),
                }
            }
        }

        if lines > records.len() {
            Self::compact(path, &records)?;
            info!("Compacted {} log lines into {} records", lines, records.len());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ScrapingError::StorageError(format!("Failed to open file: {}", e)))?;

        Ok((records, file, next_seq))
    }

    /// Rewrite the log with one line per record, in insertion order.
    fn compact(path: &Path, records: &HashMap<(String, String), PersistedRecord>) -> Result<()> {
        let mut folded: Vec<&PersistedRecord> = records.values().collect();
        folded.sort_by_key(|record| record.seq);

        let tmp_path = path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)
                .map_err(|e| ScrapingError::StorageError(format!("Failed to create {}: {}", tmp_path.display(), e)))?;
            for record in folded {
                Self::append(&mut tmp, record)?;
            }
            tmp.sync_all()
                .map_err(|e| ScrapingError::StorageError(format!("Failed to sync {}: {}", tmp_path.display(), e)))?;
        }
        fs::rename(&tmp_path, path)
            .map_err(|e| ScrapingError::StorageError(format!("Failed to replace {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn append(file: &mut File, record: &PersistedRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| ScrapingError::StorageError(format!("JSON serialization failed: {}", e)))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush())
            .map_err(|e| ScrapingError::StorageError(format!("Failed to write record: {}", e)))?;
        Ok(())
    }

    fn disable(&self, state: &mut StoreState, reason: &str) {
        error!("Disabling record store at {}: {}", self.path.display(), reason);
        self.enabled.store(false, Ordering::SeqCst);
        state.file = None;
    }

    async fn write(&self, keyword: &str, text: &str, relevant: bool, insert: bool) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let mut state = self.state.lock().await;
        let key = (keyword.to_string(), dedup_key(keyword, text));

        let record = match state.records.get(&key) {
            Some(existing) if existing.relevant == relevant => return true,
            Some(existing) => PersistedRecord {
                relevant,
                ..existing.clone()
            },
            None if insert => {
                let seq = state.next_seq;
                PersistedRecord {
                    keyword: keyword.to_string(),
                    text: text.to_string(),
                    dedup_key: key.1.clone(),
                    relevant,
                    inserted_at: Utc::now(),
                    seq,
                }
            }
            None => return false,
        };

        let outcome = match state.file.as_mut() {
            Some(file) => Self::append(file, &record),
            None => Err(ScrapingError::StorageError("store file is closed".to_string()).into()),
        };

        match outcome {
            Ok(()) => {
                if record.seq == state.next_seq {
                    state.next_seq += 1;
                }
                state.records.insert(key, record);
                true
            }
            Err(e) => {
                warn!("[store upsert] error for '{}': {}", keyword, e);
                self.disable(&mut state, &e.to_string());
                false
            }
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn upsert_record(&self, keyword: &str, text: &str, relevant: bool) -> bool {
        self.write(keyword, text, relevant, true).await
    }

    async fn fetch_records(&self, query: &RecordQuery) -> Vec<PersistedRecord> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let state = self.state.lock().await;
        let mut matching: Vec<PersistedRecord> = state
            .records
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        drop(state);

        matching.sort_by(|a, b| b.inserted_at.cmp(&a.inserted_at).then(b.seq.cmp(&a.seq)));
        matching.truncate(query.limit);

        debug!("Fetched {} records", matching.len());
        matching
    }

    async fn update_relevance(&self, keyword: &str, text: &str, relevant: bool) -> bool {
        self.write(keyword, text, relevant, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dedup_key_is_stable_and_keyword_scoped() {
        assert_eq!(dedup_key("flood", "water rising"), dedup_key("flood", "water rising"));
        assert_ne!(dedup_key("flood", "water rising"), dedup_key("cyclone", "water rising"));
        assert_eq!(dedup_key("a", "b").len(), 64);
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_record() {
        let temp_dir = tempdir().unwrap();
        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");
        assert!(store.is_enabled());

        assert!(store.upsert_record("flood", "river burst its banks", false).await);
        let first = store.fetch_records(&RecordQuery::new(10)).await;
        assert_eq!(first.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(store.upsert_record("flood", "river burst its banks", true).await);

        let records = store.fetch_records(&RecordQuery::new(10)).await;
        assert_eq!(records.len(), 1);
        assert!(records[0].relevant);
        assert_eq!(records[0].inserted_at, first[0].inserted_at);
    }

    fn log_lines(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count()
    }

    #[tokio::test]
    async fn test_unchanged_upserts_do_not_grow_log() {
        let temp_dir = tempdir().unwrap();
        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");

        for _ in 0..100 {
            assert!(store.upsert_record("flood", "same text", false).await);
        }
        assert_eq!(log_lines(store.path()), 1);

        assert!(store.upsert_record("flood", "same text", true).await);
        assert!(store.update_relevance("flood", "same text", true).await);
        assert_eq!(log_lines(store.path()), 2);
        assert_eq!(store.fetch_records(&RecordQuery::new(10)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_compacts_log() {
        let temp_dir = tempdir().unwrap();
        let path = {
            let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");
            store.upsert_record("flood", "levee breach", false).await;
            store.upsert_record("flood", "levee breach", true).await;
            store.upsert_record("flood", "levee breach", false).await;
            store.upsert_record("cyclone", "landfall", true).await;
            store.path().to_path_buf()
        };
        assert_eq!(log_lines(&path), 4);

        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");

        assert_eq!(log_lines(&path), 2);
        assert!(!temp_dir.path().join("tweets.jsonl.tmp").exists());
        let records = store.fetch_records(&RecordQuery::new(10)).await;
        assert_eq!(records.len(), 2);
        let breach = records.iter().find(|r| r.text == "levee breach").unwrap();
        assert!(!breach.relevant);
        assert_eq!(records[0].text, "landfall");

        assert!(store.upsert_record("quake", "aftershock", true).await);
        assert_eq!(log_lines(&path), 3);
    }

    #[tokio::test]
    async fn test_fetch_relevant_only_ordered_and_limited() {
        let temp_dir = tempdir().unwrap();
        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");

        for i in 0..6 {
            assert!(store.upsert_record("flood", &format!("report {}", i), i % 2 == 0).await);
        }
        assert!(store.upsert_record("cyclone", "landfall expected", true).await);

        let records = store.fetch_records(&RecordQuery::new(3).relevant_only()).await;

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.relevant));
        for pair in records.windows(2) {
            assert!(pair[0].inserted_at >= pair[1].inserted_at);
            assert!(pair[0].seq > pair[1].seq);
        }
        assert_eq!(records[0].text, "landfall expected");
    }

    #[tokio::test]
    async fn test_fetch_filters_by_keyword_and_set() {
        let temp_dir = tempdir().unwrap();
        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");

        store.upsert_record("flood", "a", true).await;
        store.upsert_record("cyclone", "b", false).await;
        store.upsert_record("quake", "c", true).await;

        let flood = store.fetch_records(&RecordQuery::new(10).keyword("flood")).await;
        assert_eq!(flood.len(), 1);
        assert_eq!(flood[0].keyword, "flood");

        let set = store
            .fetch_records(&RecordQuery::new(10).keywords(vec!["flood".to_string(), "cyclone".to_string()]))
            .await;
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|r| r.keyword != "quake"));

        let exact = store.fetch_records(&RecordQuery::new(10).keyword("FLOOD")).await;
        assert!(exact.is_empty());
        let folded = store
            .fetch_records(&RecordQuery::new(10).keywords(vec!["FLOOD".to_string()]).ignore_case())
            .await;
        assert_eq!(folded.len(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = tempdir().unwrap();
        {
            let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");
            store.upsert_record("flood", "levee breach", false).await;
            store.upsert_record("flood", "levee breach", true).await;
            store.upsert_record("flood", "all clear", false).await;
        }

        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");
        let records = store.fetch_records(&RecordQuery::new(10)).await;

        assert_eq!(records.len(), 2);
        let breach = records.iter().find(|r| r.text == "levee breach").unwrap();
        assert!(breach.relevant);

        // sequence numbers continue after reopen
        assert!(store.upsert_record("flood", "new report", false).await);
        let latest = store.fetch_records(&RecordQuery::new(1)).await;
        assert_eq!(latest[0].text, "new report");
    }

    #[tokio::test]
    async fn test_update_relevance_only_touches_existing() {
        let temp_dir = tempdir().unwrap();
        let store = FileRecordStore::open(temp_dir.path(), "tweets.jsonl");

        assert!(!store.update_relevance("flood", "unknown", true).await);
        store.upsert_record("flood", "known", false).await;
        assert!(store.update_relevance("flood", "known", true).await);

        let records = store.fetch_records(&RecordQuery::new(10).relevant_only()).await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_noop() {
        let temp_dir = tempdir().unwrap();
        // a regular file where the directory should be
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let store = FileRecordStore::open(&blocker, "tweets.jsonl");

        assert!(!store.is_enabled());
        assert!(!store.upsert_record("flood", "text", true).await);
        assert!(store.fetch_records(&RecordQuery::new(10)).await.is_empty());
        assert!(!store.update_relevance("flood", "text", true).await);
    }

    #[test]
    fn test_external_shape() {
        let record = PersistedRecord {
            keyword: "flood".to_string(),
            text: "water".to_string(),
            dedup_key: dedup_key("flood", "water"),
            relevant: true,
            inserted_at: DateTime::parse_from_rfc3339("2024-01-15T10:30:45Z").unwrap().with_timezone(&Utc),
            seq: 0,
        };

        let value = serde_json::to_value(TweetRecord::from(&record)).unwrap();

        assert_eq!(value["keyword"], "flood");
        assert_eq!(value["relevant"], true);
        assert_eq!(value["inserted_at"], "2024-01-15T10:30:45+00:00");
        assert!(value.get("dedup_key").is_none());
    }
}
