use crate::context::storage::StorageMap;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Long-lived storage of function instances, keyed by instance identity.
///
/// The harness never writes here during a run; the caller loads a snapshot before the
/// run and persists the reported post-run map afterwards.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Stored map of `instance`, empty if none.
    async fn load(&self, instance: &str) -> Result<StorageMap>;

    /// Replace the stored map of `instance`.
    async fn persist(&self, instance: &str, storage: &StorageMap) -> Result<()>;

    /// Drop the stored map of `instance`.
    async fn clear(&self, instance: &str) -> Result<()>;

    /// Where the store keeps its data, if on disk.
    fn path(&self) -> Option<PathBuf>;
}
