//! Store module: persistence of function-instance storage between runs.
//!
//! Engines: JSON files on disk, or memory.
//! Use `store::open(Some(dir))` to get an `Arc<dyn SnapshotStore>` for the CLI.

pub mod fs_store;
pub mod memory_store;
pub mod traits;

pub use fs_store::FsSnapshotStore;
pub use memory_store::MemorySnapshotStore;
pub use traits::SnapshotStore;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Filesystem store under `dir`, or an in-memory one when no directory is configured.
pub fn open(dir: Option<&Path>) -> Result<Arc<dyn SnapshotStore>> {
    Ok(match dir {
        Some(dir) => Arc::new(FsSnapshotStore::open(dir)?),
        None => Arc::new(MemorySnapshotStore::new()),
    })
}
