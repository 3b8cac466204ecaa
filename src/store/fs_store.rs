use crate::context::storage::StorageMap;
use crate::store::traits::SnapshotStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// One JSON file per instance, named by the hex of the instance id.
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).with_context(|| format!("create storage dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn instance_path(&self, instance: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(instance)))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    fn name(&self) -> String {
        "fs".into()
    }

    async fn load(&self, instance: &str) -> Result<StorageMap> {
        let p = self.instance_path(instance);
        if !p.exists() {
            return Ok(StorageMap::new());
        }
        let raw = fs::read(&p).await.with_context(|| format!("read {}", p.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", p.display()))
    }

    async fn persist(&self, instance: &str, storage: &StorageMap) -> Result<()> {
        let p = self.instance_path(instance);
        // write-then-rename: readers never observe a partial file
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(storage)?).await?;
        fs::rename(&tmp, &p).await.with_context(|| format!("persist {}", p.display()))?;
        debug!(instance, keys = storage.len(), "storage persisted");
        Ok(())
    }

    async fn clear(&self, instance: &str) -> Result<()> {
        let p = self.instance_path(instance);
        if p.exists() {
            fs::remove_file(&p).await?;
        }
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::open(dir.path()).unwrap();
        assert!(store.load("advertising-board").await.unwrap().is_empty());

        let map = StorageMap::from([("lastPost".to_string(), "1700000000".to_string())]);
        store.persist("advertising-board", &map).await.unwrap();

        let reopened = FsSnapshotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load("advertising-board").await.unwrap(), map);
        assert!(reopened.load("oracle").await.unwrap().is_empty());

        reopened.clear("advertising-board").await.unwrap();
        assert!(reopened.load("advertising-board").await.unwrap().is_empty());
    }
}
