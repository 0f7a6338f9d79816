//! Storage node server

use crate::common::serve::serve_router;
use crate::common::{retry_with_backoff, MetricsRegistry, NodeConfig, Result};
use crate::node::http::{create_router, NodeState};
use crate::node::store::{ContentStore, DiskStore, MemStore};
use crate::proxy::{build_http_client, CoordinatorClient, MetadataService};
use std::sync::Arc;
use std::time::Duration;

const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);
const REGISTER_RETRIES: usize = 8;

pub struct StorageNode {
    config: NodeConfig,
}

impl StorageNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Disk-backed store when a data path is configured, otherwise in memory
    pub fn open_store(&self) -> Result<Arc<dyn ContentStore>> {
        match &self.config.data_path {
            Some(path) => Ok(Arc::new(DiskStore::open(path)?)),
            None => {
                tracing::warn!("No data path configured, content is kept in memory only");
                Ok(Arc::new(MemStore::new()))
            }
        }
    }

    /// Announce this node to the coordinator, retrying while it is unreachable
    pub async fn register(coordinator_url: &str, endpoint: &str) -> Result<()> {
        let http = build_http_client(REGISTER_TIMEOUT, None)?;
        let client = CoordinatorClient::new(coordinator_url, http);

        retry_with_backoff(
            || client.register_node(endpoint),
            REGISTER_RETRIES,
            Duration::from_millis(250),
        )
        .await?;
        tracing::info!("✓ Registered with coordinator {} as {}", coordinator_url, endpoint);
        Ok(())
    }

    pub async fn serve(self) -> Result<()> {
        let endpoint = self.config.advertise_url();
        tracing::info!("Starting storage node");
        tracing::info!("  Blob API: {}", self.config.bind_addr);
        tracing::info!("  Advertised as: {}", endpoint);
        tracing::info!("  Coordinator: {}", self.config.coordinator_url);
        if let Some(path) = &self.config.data_path {
            tracing::info!("  Data path: {}", path.display());
        }

        let store = self.open_store()?;
        let router = create_router(
            NodeState {
                store,
                metrics: Arc::new(MetricsRegistry::new()),
                endpoint: endpoint.clone(),
            },
            self.config.max_blob_size as usize,
        );

        let coordinator_url = self.config.coordinator_url.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::register(&coordinator_url, &endpoint).await {
                tracing::error!("Failed to register with coordinator: {}", e);
            }
        });

        tracing::info!("✓ Storage node ready");
        serve_router(self.config.bind_addr, self.config.tls.as_ref(), router).await?;
        tracing::info!("Storage node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_follows_data_path() {
        let node = StorageNode::new(NodeConfig::default());
        let store = node.open_store().unwrap();
        store.put("/a", b"x").unwrap();
        assert_eq!(store.len().unwrap(), 1);

        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let store = StorageNode::new(config.clone()).open_store().unwrap();
        store.put("/a", b"persisted").unwrap();

        let reopened = StorageNode::new(config).open_store().unwrap();
        assert_eq!(reopened.get("/a").unwrap().unwrap(), b"persisted");
    }
}
