//! Inventory sources
//!
//! The inventory answers one question: which instances are running right now.
//! The EC2 adapter lives in `crate::aws`; this module holds the seam and a
//! file-backed source for offline runs.

use std::path::PathBuf;
use tracing::debug;

use super::Instance;

/// Source of running-instance records
#[async_trait::async_trait]
pub trait InventorySource: Send + Sync {
    /// List instances currently in the running state
    async fn running_instances(&self) -> Result<Vec<Instance>, InventoryError>;
}

/// Inventory errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("Inventory query failed: {0}")]
    Query(String),

    #[error("Inventory authentication failed: {0}")]
    Auth(String),

    #[error("Invalid inventory response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Inventory read from a JSON file holding an array of instances
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl InventorySource for FileInventory {
    async fn running_instances(&self) -> Result<Vec<Instance>, InventoryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| InventoryError::Io(format!("{}: {}", self.path.display(), e)))?;

        let instances: Vec<Instance> = serde_json::from_str(&content)
            .map_err(|e| InventoryError::InvalidResponse(e.to_string()))?;

        let running: Vec<Instance> = instances.into_iter().filter(Instance::is_running).collect();
        debug!(path = %self.path.display(), count = running.len(), "Loaded inventory file");

        Ok(running)
    }
}

/// Fixed in-memory inventory
#[async_trait::async_trait]
impl InventorySource for Vec<Instance> {
    async fn running_instances(&self) -> Result<Vec<Instance>, InventoryError> {
        Ok(self.iter().filter(|i| i.is_running()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InstanceState;
    use std::io::Write;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_file_inventory_filters_running() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "i-1", "name": "ha-A", "private_address": "10.0.1.1",
                  "public_address": "54.0.0.1", "state": "running"}},
                {{"id": "i-2", "name": "ha-B", "private_address": "10.0.1.2",
                  "state": "stopped"}}
            ]"#
        )
        .unwrap();

        let inventory = FileInventory::new(file.path());
        let instances = inventory.running_instances().await.unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "i-1");
        assert_eq!(instances[0].public_address, Some(Ipv4Addr::new(54, 0, 0, 1)));
        assert_eq!(instances[0].state, InstanceState::Running);
    }

    #[tokio::test]
    async fn test_file_inventory_missing_file() {
        let inventory = FileInventory::new("/nonexistent/inventory.json");
        let err = inventory.running_instances().await.unwrap_err();
        assert!(matches!(err, InventoryError::Io(_)));
    }
}
