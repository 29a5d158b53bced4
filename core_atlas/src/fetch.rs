use std::collections::HashMap;
use std::time::Instant;

use atlas_store::{Store, StoreError};
use tracing::debug;

/// Upper bound on simultaneous field-set requests per batch. Bounds peak
/// store load regardless of how many keys a scan turns up.
pub const MAX_FETCH_BATCH: usize = 2000;

/// Page size requested per scan call. Scanning in pages is slower than a
/// full key listing but leaves the store gaps to serve other work.
pub const SCAN_PAGE_SIZE: usize = 5000;

/// Enumerate every key matching `pattern` via cursor-paged scanning, then
/// retrieve each key's field set in batches of at most [`MAX_FETCH_BATCH`].
/// Any scan or batch failure aborts the whole fetch; the caller abandons
/// the cycle and keeps its previous snapshot.
pub fn fetch_matching<S: Store + ?Sized>(
    store: &S,
    pattern: &str,
) -> Result<Vec<(String, HashMap<String, String>)>, StoreError> {
    let started = Instant::now();

    let mut keys = Vec::new();
    let mut cursor = 0;
    loop {
        let page = store.scan_page(cursor, pattern, SCAN_PAGE_SIZE)?;
        keys.extend(page.keys);
        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }

    let mut records = Vec::with_capacity(keys.len());
    for chunk in keys.chunks(MAX_FETCH_BATCH) {
        let field_sets = store.hash_fields_many(chunk)?;
        records.extend(chunk.iter().cloned().zip(field_sets));
    }

    debug!(
        pattern,
        keys = records.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "store scan complete"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_store::{MemoryStore, ScanPage};
    use std::sync::Mutex;

    #[test]
    fn fetches_every_matching_key() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.set_hash_field(&format!("entityinfo:{i}"), "EntityID", &i.to_string());
        }
        store.set_hash_field("other:1", "EntityID", "x");

        let records = fetch_matching(&store, "entityinfo:*").unwrap();
        assert_eq!(records.len(), 10);
        assert!(records
            .iter()
            .all(|(key, fields)| key.starts_with("entityinfo:") && !fields.is_empty()));
    }

    /// Store wrapper that records the size of every multi-get batch.
    struct BatchSpy {
        inner: MemoryStore,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl Store for BatchSpy {
        fn scan_page(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> Result<ScanPage, StoreError> {
            self.inner.scan_page(cursor, pattern, count)
        }

        fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
            self.inner.hash_fields(key)
        }

        fn hash_fields_many(
            &self,
            keys: &[String],
        ) -> Result<Vec<HashMap<String, String>>, StoreError> {
            self.batch_sizes.lock().unwrap().push(keys.len());
            self.inner.hash_fields_many(keys)
        }

        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError> {
            self.inner.publish(channel, message)
        }
    }

    #[test]
    fn batches_never_exceed_the_cap() {
        let spy = BatchSpy {
            inner: MemoryStore::new(),
            batch_sizes: Mutex::new(Vec::new()),
        };
        for i in 0..(MAX_FETCH_BATCH + 5) {
            spy.inner
                .set_hash_field(&format!("entityinfo:{i:05}"), "EntityID", &i.to_string());
        }

        let records = fetch_matching(&spy, "entityinfo:*").unwrap();
        assert_eq!(records.len(), MAX_FETCH_BATCH + 5);

        let sizes = spy.batch_sizes.lock().unwrap();
        assert_eq!(sizes.len(), 2);
        assert!(sizes.iter().all(|&size| size <= MAX_FETCH_BATCH));
        assert_eq!(sizes.iter().sum::<usize>(), MAX_FETCH_BATCH + 5);
    }

    #[test]
    fn empty_scan_is_not_an_error() {
        let store = MemoryStore::new();
        assert!(fetch_matching(&store, "entityinfo:*").unwrap().is_empty());
    }
}
