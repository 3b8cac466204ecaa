use crate::context::storage::StorageMap;
use crate::store::traits::SnapshotStore;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

/// In-memory snapshots, for tests and embedding.
#[derive(Default)]
pub struct MemorySnapshotStore {
    instances: Mutex<HashMap<String, StorageMap>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn name(&self) -> String {
        "memory".into()
    }

    async fn load(&self, instance: &str) -> Result<StorageMap> {
        Ok(self.instances.lock().get(instance).cloned().unwrap_or_default())
    }

    async fn persist(&self, instance: &str, storage: &StorageMap) -> Result<()> {
        self.instances.lock().insert(instance.to_string(), storage.clone());
        Ok(())
    }

    async fn clear(&self, instance: &str) -> Result<()> {
        self.instances.lock().remove(instance);
        Ok(())
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }
}
