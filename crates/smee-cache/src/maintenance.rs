//! Read-side cache of room maintenance windows.
//!
//! Maintenance state annotates rooms for operators; it is never consulted
//! to suppress alert creation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use smee_core::error::Result;
use smee_core::stores::MaintenanceStore;
use smee_core::types::MaintenanceInfo;

/// In-memory maintenance-window cache with optional write-through
/// backing.
#[derive(Default)]
pub struct MaintenanceCache {
    backing: Option<Arc<dyn MaintenanceStore>>,
    rooms: RwLock<HashMap<String, MaintenanceInfo>>,
}

impl MaintenanceCache {
    /// Creates an empty cache with no backing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a persistent backing store for writes and startup sync.
    #[must_use]
    pub fn with_backing(mut self, backing: Arc<dyn MaintenanceStore>) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Replaces the cache contents from the backing store.
    pub async fn sync(&self) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        rooms.clear();

        if let Some(backing) = &self.backing {
            rooms.extend(backing.rooms_in_maintenance().await?);
        }

        info!(rooms_in_maintenance = rooms.len(), "synced maintenance cache");
        Ok(())
    }
}

#[async_trait]
impl MaintenanceStore for MaintenanceCache {
    async fn rooms_in_maintenance(&self) -> Result<HashMap<String, MaintenanceInfo>> {
        let rooms = self.rooms.read().await;

        Ok(rooms
            .iter()
            .filter(|(_, info)| info.enabled())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn room_maintenance_info(&self, room_id: &str) -> Result<MaintenanceInfo> {
        let rooms = self.rooms.read().await;

        Ok(rooms.get(room_id).cloned().unwrap_or(MaintenanceInfo {
            room_id: room_id.to_string(),
            start: None,
            end: None,
        }))
    }

    async fn set_maintenance_info(&self, info: MaintenanceInfo) -> Result<()> {
        let mut rooms = self.rooms.write().await;

        if let Some(backing) = &self.backing {
            backing.set_maintenance_info(info.clone()).await?;
        }

        rooms.insert(info.room_id.clone(), info);
        Ok(())
    }
}
