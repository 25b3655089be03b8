//! Process-wide LRU cache of extraction results with debounced JSON
//! snapshots.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use quorum_core::ExtractionResult;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::CacheError;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    /// Least recently used first.
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    input: String,
    entities: Vec<ExtractionResult>,
}

struct CacheInner {
    entries: Mutex<LruCache<String, Vec<ExtractionResult>>>,
    snapshot_path: Option<PathBuf>,
    debounce: Duration,
    dirty: AtomicBool,
    dump_disabled: AtomicBool,
    changed: Notify,
}

/// Cache of extraction results keyed by raw input.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct EntityCache {
    inner: Arc<CacheInner>,
    debouncer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EntityCache {
    pub fn new(capacity: NonZeroUsize, snapshot_path: Option<PathBuf>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(LruCache::new(capacity)),
                snapshot_path,
                debounce,
                dirty: AtomicBool::new(false),
                dump_disabled: AtomicBool::new(false),
                changed: Notify::new(),
            }),
            debouncer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get(&self, input: &str) -> Option<Vec<ExtractionResult>> {
        self.inner.lock().get(input).cloned()
    }

    pub fn put(&self, input: String, entities: Vec<ExtractionResult>) {
        self.inner.lock().put(input, entities);
        self.inner.dirty.store(true, Ordering::Release);
        self.inner.changed.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a failed dump has switched persistence off.
    pub fn dumps_disabled(&self) -> bool {
        self.inner.dump_disabled.load(Ordering::Acquire)
    }

    /// Warm the cache from the snapshot file, if there is one.
    ///
    /// Returns the number of entries loaded.
    pub async fn load(&self) -> Result<usize, CacheError> {
        let Some(path) = self.inner.snapshot_path.as_deref() else {
            return Ok(0);
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let count = snapshot.entries.len();

        let mut entries = self.inner.lock();
        for entry in snapshot.entries {
            entries.put(entry.input, entry.entities);
        }
        info!(count, path = %path.display(), "loaded entity cache snapshot");
        Ok(count)
    }

    /// Write the whole cache to the snapshot file.
    pub async fn dump(&self) -> Result<(), CacheError> {
        self.inner.dump().await
    }

    /// Dump if something changed since the last dump.
    ///
    /// A failed dump disables persistence for the rest of the process.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Start the background task that flushes after a quiet period.
    ///
    /// Must be called from within a Tokio runtime. No-op without a snapshot path.
    pub fn start_debounce(&self) {
        if self.inner.snapshot_path.is_none() {
            return;
        }
        let mut slot = self
            .debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(tokio::spawn(debounce_loop(Arc::clone(&self.inner))));
        }
    }

    /// Stop the debounce task and write any pending changes.
    pub async fn shutdown(&self) {
        let handle = self
            .debouncer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.inner.flush().await;
    }
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, LruCache<String, Vec<ExtractionResult>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush(&self) {
        if self.snapshot_path.is_none()
            || self.dump_disabled.load(Ordering::Acquire)
            || !self.dirty.swap(false, Ordering::AcqRel)
        {
            return;
        }
        if let Err(e) = self.dump().await
            && !self.dump_disabled.swap(true, Ordering::AcqRel)
        {
            warn!(error = %e, "entity cache dump failed, disabling further dumps");
        }
    }

    async fn dump(&self) -> Result<(), CacheError> {
        let path = self
            .snapshot_path
            .as_deref()
            .ok_or(CacheError::NoSnapshotPath)?;

        let snapshot = {
            let entries = self.lock();
            // LruCache iterates most recent first; store oldest first so a
            // reload rebuilds the same recency order.
            Snapshot {
                entries: entries
                    .iter()
                    .rev()
                    .map(|(input, entities)| SnapshotEntry {
                        input: input.clone(),
                        entities: entities.clone(),
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_vec(&snapshot)?;
        write_atomically(path, &json).await?;
        debug!(count = snapshot.entries.len(), path = %path.display(), "dumped entity cache");
        Ok(())
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

async fn debounce_loop(inner: Arc<CacheInner>) {
    loop {
        inner.changed.notified().await;
        // Restart the quiet period on every further change.
        loop {
            tokio::select! {
                _ = inner.changed.notified() => continue,
                _ = tokio::time::sleep(inner.debounce) => break,
            }
        }
        inner.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(value: i64) -> ExtractionResult {
        ExtractionResult {
            entity_type: "number".into(),
            value: serde_json::json!(value),
            unit: None,
            start: 0,
            end: 1,
            confidence: 1.0,
            source_text: value.to_string(),
            extractor_id: "system".into(),
        }
    }

    fn cache(capacity: usize, path: Option<PathBuf>) -> EntityCache {
        EntityCache::new(
            NonZeroUsize::new(capacity).unwrap(),
            path,
            Duration::from_millis(50),
        )
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2, None);
        cache.put("one".into(), vec![entity(1)]);
        cache.put("two".into(), vec![entity(2)]);
        // Touch "one" so "two" becomes the eviction candidate.
        assert!(cache.get("one").is_some());
        cache.put("three".into(), vec![entity(3)]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("two").is_none());
        assert_eq!(cache.get("one").unwrap()[0].value, serde_json::json!(1));
    }

    #[tokio::test]
    async fn dump_and_load_preserve_entries_and_recency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("entities_cache.json");

        let original = cache(10, Some(path.clone()));
        original.put("old".into(), vec![entity(1)]);
        original.put("new".into(), vec![entity(2), entity(3)]);
        original.dump().await.unwrap();

        let restored = cache(1, Some(path));
        assert_eq!(restored.load().await.unwrap(), 2);
        // Capacity 1 keeps only the most recently used entry.
        assert!(restored.get("old").is_none());
        assert_eq!(restored.get("new").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn load_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(10, Some(dir.path().join("missing.json")));
        assert_eq!(cache.load().await.unwrap(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn load_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities_cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = cache(10, Some(path));
        assert!(matches!(cache.load().await, Err(CacheError::Json(_))));
    }

    #[tokio::test]
    async fn failed_dump_disables_persistence() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the snapshot directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let cache = cache(10, Some(blocker.join("entities_cache.json")));

        cache.put("3".into(), vec![entity(3)]);
        cache.flush().await;
        assert!(cache.dumps_disabled());

        // In-memory caching keeps working.
        cache.put("4".into(), vec![entity(4)]);
        cache.flush().await;
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn shutdown_without_snapshot_path_keeps_dumps_enabled() {
        let cache = cache(10, None);
        cache.put("3".into(), vec![entity(3)]);

        cache.shutdown().await;
        assert!(!cache.dumps_disabled());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn flush_skips_clean_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities_cache.json");
        let cache = cache(10, Some(path.clone()));

        cache.flush().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn debounced_dump_after_quiet_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities_cache.json");
        let cache = cache(10, Some(path.clone()));
        cache.start_debounce();

        cache.put("3".into(), vec![entity(3)]);
        cache.put("4".into(), vec![entity(4)]);
        assert!(!path.exists());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(path.exists());

        let snapshot: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities_cache.json");
        let cache = EntityCache::new(
            NonZeroUsize::new(10).unwrap(),
            Some(path.clone()),
            Duration::from_secs(3600),
        );
        cache.start_debounce();
        cache.put("3".into(), vec![entity(3)]);

        cache.shutdown().await;
        assert!(path.exists());
    }
}
