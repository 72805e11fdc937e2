//! Local persistence of an endpoint's last known session state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::{cache::SessionCache, domain::EndpointId};
use storage::Storage;
use tokio::sync::Mutex;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Option<SessionCache>>;
    /// Overwrites the previous snapshot.
    async fn save(&self, cache: &SessionCache) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Snapshot kept in the shared SQLite database, one row per endpoint.
pub struct SqliteSnapshotStore {
    storage: Storage,
    endpoint: EndpointId,
}

impl SqliteSnapshotStore {
    pub async fn open(database_url: &str, endpoint: EndpointId) -> Result<Self> {
        let storage = Storage::new(database_url)
            .await
            .with_context(|| format!("failed to open snapshot storage at '{database_url}'"))?;
        Ok(Self { storage, endpoint })
    }

    pub fn with_storage(storage: Storage, endpoint: EndpointId) -> Self {
        Self { storage, endpoint }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<SessionCache>> {
        let Some(stored) = self.storage.load_snapshot(self.endpoint).await? else {
            return Ok(None);
        };
        let cache = serde_json::from_str(&stored.snapshot_json).with_context(|| {
            format!("corrupt snapshot for endpoint {}", self.endpoint)
        })?;
        Ok(Some(cache))
    }

    async fn save(&self, cache: &SessionCache) -> Result<()> {
        let json = serde_json::to_string(cache)?;
        self.storage.save_snapshot(self.endpoint, &json).await
    }

    async fn clear(&self) -> Result<()> {
        self.storage.clear_snapshot(self.endpoint).await?;
        Ok(())
    }
}

/// Process-local store; state does not survive a restart.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<SessionCache>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(cache: SessionCache) -> Self {
        Self {
            snapshot: Mutex::new(Some(cache)),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<SessionCache>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, cache: &SessionCache) -> Result<()> {
        *self.snapshot.lock().await = Some(cache.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.snapshot.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/snapshot_tests.rs"]
mod tests;
