//! Per-run storage: read-your-writes buffering over a snapshot, and the diff reported back.
//!
//! The caller's backing store is never touched. Writes land in an ordered log; the
//! post-run map is the snapshot overlaid with that log, and the caller persists it.

use crate::runtime::limiter::ResourceLimiter;
use crate::utils::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type StorageMap = BTreeMap<String, String>;

/// Byte size of a storage map as counted against the storage ceiling.
pub fn storage_size(map: &StorageMap) -> u64 {
    map.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum()
}

/// Ordered write log over an immutable snapshot.
#[derive(Debug, Clone, Default)]
pub struct StorageDiffTracker {
    snapshot: StorageMap,
    /// (key, value) in issue order; `None` deletes the key.
    writes: Vec<(String, Option<String>)>,
}

impl StorageDiffTracker {
    pub fn new(snapshot: StorageMap) -> Self {
        Self { snapshot, writes: Vec::new() }
    }

    /// Most recent write for `key`, else the snapshot value.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.writes.iter().rev().find(|(k, _)| k == key) {
            Some((_, value)) => value.clone(),
            None => self.snapshot.get(key).cloned(),
        }
    }

    pub fn record(&mut self, key: String, value: Option<String>) {
        self.writes.push((key, value));
    }

    pub fn writes(&self) -> &[(String, Option<String>)] {
        &self.writes
    }

    pub fn snapshot(&self) -> &StorageMap {
        &self.snapshot
    }

    /// Snapshot overlaid with every write, in order.
    pub fn merged(&self) -> StorageMap {
        let mut out = self.snapshot.clone();
        for (key, value) in &self.writes {
            match value {
                Some(v) => {
                    out.insert(key.clone(), v.clone());
                }
                None => {
                    out.remove(key);
                }
            }
        }
        out
    }

    /// Size the merged map would have after one more write.
    pub fn projected_size(&self, key: &str, value: Option<&str>) -> u64 {
        let mut merged = self.merged();
        match value {
            Some(v) => {
                merged.insert(key.to_string(), v.to_string());
            }
            None => {
                merged.remove(key);
            }
        }
        storage_size(&merged)
    }

    pub fn report(&self) -> StorageReport {
        let storage = self.merged();
        let state = if storage == self.snapshot { StorageState::Unchanged } else { StorageState::Updated };
        let size = storage_size(&storage);
        StorageReport { state, storage, size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageState {
    Updated,
    Unchanged,
}

/// Storage section of a run outcome: the full post-run map, not only changed keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReport {
    pub state: StorageState,
    pub storage: StorageMap,
    pub size: u64,
}

impl StorageReport {
    pub fn unchanged(snapshot: StorageMap) -> Self {
        let size = storage_size(&snapshot);
        Self { state: StorageState::Unchanged, storage: snapshot, size }
    }
}

/// Storage capability handed to function bodies.
#[async_trait]
pub trait StorageAccess: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;
}

/// Host-side storage: buffers into the run's tracker, size-checked by the limiter.
pub struct HostStorage {
    tracker: Arc<Mutex<StorageDiffTracker>>,
    limiter: Arc<ResourceLimiter>,
}

impl HostStorage {
    pub fn new(tracker: Arc<Mutex<StorageDiffTracker>>, limiter: Arc<ResourceLimiter>) -> Self {
        Self { tracker, limiter }
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut tracker = self.tracker.lock();
        let projected = tracker.projected_size(key, value);
        self.limiter.check_storage(projected)?;
        tracker.record(key.to_string(), value.map(str::to_string));
        Ok(())
    }
}

#[async_trait]
impl StorageAccess for HostStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.limiter.check_deadline()?;
        Ok(self.tracker.lock().get(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write(key, None)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.limiter.check_deadline()?;
        Ok(self.tracker.lock().merged().into_keys().collect())
    }
}

/// Storage facade exposed on the execution context.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<dyn StorageAccess>,
}

impl Storage {
    pub fn new(inner: Arc<dyn StorageAccess>) -> Self {
        Self { inner }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: &str, value: impl AsRef<str>) -> Result<()> {
        self.inner.set(key, value.as_ref()).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::limiter::{LimitOverrides, RunLimits};
    use crate::runtime::builder::FunctionSchema;
    use crate::utils::{HarnessError, LimitKind};

    fn snapshot() -> StorageMap {
        StorageMap::from([("lastPost".to_string(), "100".to_string())])
    }

    #[test]
    fn reads_observe_latest_write() {
        let mut t = StorageDiffTracker::new(snapshot());
        assert_eq!(t.get("lastPost").as_deref(), Some("100"));
        t.record("lastPost".into(), Some("200".into()));
        t.record("lastPost".into(), Some("300".into()));
        assert_eq!(t.get("lastPost").as_deref(), Some("300"));
        assert_eq!(t.get("missing"), None);
        t.record("lastPost".into(), None);
        assert_eq!(t.get("lastPost"), None);
    }

    #[test]
    fn report_carries_full_map() {
        let mut t = StorageDiffTracker::new(snapshot());
        t.record("count".into(), Some("1".into()));
        let report = t.report();
        assert_eq!(report.state, StorageState::Updated);
        assert_eq!(report.storage.len(), 2);
        assert_eq!(report.storage["lastPost"], "100");
        assert_eq!(report.size, ("lastPost100".len() + "count1".len()) as u64);
    }

    #[test]
    fn rewriting_same_value_is_unchanged() {
        let mut t = StorageDiffTracker::new(snapshot());
        t.record("lastPost".into(), Some("100".into()));
        t.record("tmp".into(), Some("x".into()));
        t.record("tmp".into(), None);
        assert_eq!(t.report().state, StorageState::Unchanged);
    }

    #[test]
    fn deleting_a_key_is_an_update() {
        let mut t = StorageDiffTracker::new(snapshot());
        t.record("lastPost".into(), None);
        let report = t.report();
        assert_eq!(report.state, StorageState::Updated);
        assert!(report.storage.is_empty());
    }

    #[tokio::test]
    async fn host_storage_enforces_size_before_writing() {
        let schema = FunctionSchema::default();
        let overrides = LimitOverrides { storage_limit: Some(16), ..Default::default() };
        let limiter = Arc::new(ResourceLimiter::new(RunLimits::from_schema(&schema, &overrides)));
        let tracker = Arc::new(Mutex::new(StorageDiffTracker::new(snapshot())));
        let storage = Storage::new(Arc::new(HostStorage::new(tracker.clone(), limiter.clone())));

        storage.set("a", "1").await.unwrap();
        assert_eq!(storage.get("a").await.unwrap().as_deref(), Some("1"));

        let err = storage.set("big", "0123456789").await.unwrap_err();
        assert!(matches!(err, HarnessError::LimitExceeded { limit: LimitKind::Storage, .. }));
        assert_eq!(storage.get("big").await.unwrap(), None);
        assert_eq!(storage.keys().await.unwrap(), vec!["a".to_string(), "lastPost".to_string()]);
        assert!(limiter.fault().is_some());
    }
}
