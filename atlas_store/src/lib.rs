//! Key-value store interface for the Atlas world-state service.
//!
//! The service only ever talks to its backing store through the [`Store`]
//! trait: cursor-paged pattern scans, hash field-set retrieval (single key
//! or one batched round trip), plain string gets, and channel publishes.
//! Production deployments plug in a client for the real store behind this
//! trait; [`MemoryStore`] backs local fixture runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("scan failed for pattern {pattern:?}: {reason}")]
    Scan { pattern: String, reason: String },
    #[error("fetch failed for key {key:?}: {reason}")]
    Fetch { key: String, reason: String },
    #[error("publish failed on channel {channel:?}: {reason}")]
    Publish { channel: String, reason: String },
}

/// One page of a cursor-based key scan. A returned `cursor` of zero means
/// the scan is complete; any other value is passed to the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Client-side view of the backing key-value store.
///
/// Implementations must be safe to share across the service's poll threads.
pub trait Store: Send + Sync {
    /// Return up to `count` keys matching `pattern` (glob `*` wildcards),
    /// resuming from `cursor` (zero starts a fresh scan).
    fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError>;

    /// Full field set of a single hash key. Missing keys yield an empty map.
    fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Field sets for a batch of hash keys in one round trip, in input
    /// order. Callers are responsible for bounding the batch size.
    fn hash_fields_many(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>, StoreError>;

    /// Plain string value of a key, if present.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Publish a message to a pub/sub channel, returning the receiver count.
    fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError>;
}

/// Glob match supporting `*` wildcards only, which is all the scan patterns
/// used by the service (`entityinfo:*`, `tribedata:*`) require.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];
    let mut last: Option<&str> = None;
    for part in parts {
        last = Some(part);
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        // Pattern ends with '*': everything after the matched parts is fine.
        Some("") | None => true,
        Some(part) => rest.is_empty() || key.ends_with(part),
    }
}

#[derive(Debug, Default, Deserialize)]
struct MemoryContents {
    #[serde(default)]
    hashes: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    strings: HashMap<String, String>,
}

/// In-memory [`Store`] with deterministic scan paging over sorted keys.
///
/// Publishes are recorded so tests can assert on notification traffic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<MemoryContents>,
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load store contents from a JSON fixture document:
    /// `{ "hashes": { key: { field: value } }, "strings": { key: value } }`.
    pub fn from_fixture(json: &str) -> Result<Self, serde_json::Error> {
        let contents: MemoryContents = serde_json::from_str(json)?;
        Ok(Self {
            contents: Mutex::new(contents),
            published: Mutex::new(Vec::new()),
        })
    }

    pub fn set_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut contents = self.contents.lock().expect("memory store mutex poisoned");
        contents
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn set_string(&self, key: &str, value: &str) {
        let mut contents = self.contents.lock().expect("memory store mutex poisoned");
        contents.strings.insert(key.to_string(), value.to_string());
    }

    /// Messages published so far, oldest first.
    pub fn published_messages(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .expect("memory store mutex poisoned")
            .clone()
    }
}

impl Store for MemoryStore {
    fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError> {
        let contents = self.contents.lock().expect("memory store mutex poisoned");
        let mut matching: Vec<&String> = contents
            .hashes
            .keys()
            .chain(contents.strings.keys())
            .filter(|key| pattern_matches(pattern, key))
            .collect();
        matching.sort();
        matching.dedup();

        let start = cursor as usize;
        let end = (start + count.max(1)).min(matching.len());
        let keys = matching[start.min(matching.len())..end]
            .iter()
            .map(|key| (*key).clone())
            .collect();
        let next = if end >= matching.len() { 0 } else { end as u64 };
        Ok(ScanPage { cursor: next, keys })
    }

    fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let contents = self.contents.lock().expect("memory store mutex poisoned");
        Ok(contents.hashes.get(key).cloned().unwrap_or_default())
    }

    fn hash_fields_many(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>, StoreError> {
        let contents = self.contents.lock().expect("memory store mutex poisoned");
        Ok(keys
            .iter()
            .map(|key| contents.hashes.get(key).cloned().unwrap_or_default())
            .collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let contents = self.contents.lock().expect("memory store mutex poisoned");
        Ok(contents.strings.get(key).cloned())
    }

    fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError> {
        self.published
            .lock()
            .expect("memory store mutex poisoned")
            .push((channel.to_string(), message.to_string()));
        Ok(0)
    }
}
