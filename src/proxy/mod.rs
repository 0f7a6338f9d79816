//! Client-side proxy
//!
//! Presents one logical key/value store (`get`, `put`, `delete`, `contains`)
//! while talking to the coordinator for metadata and to storage nodes for
//! content. The two remote sides sit behind the [`MetadataService`] and
//! [`ContentNodes`] traits; HTTP implementations live in [`client`], and the
//! coordinator service itself can be plugged in directly for in-process use.

pub mod client;
pub mod coordinator_proxy;

pub use client::{build_http_client, CoordinatorClient, HttpNodes};
pub use coordinator_proxy::CoordinatorProxy;

use crate::common::types::NodeLoad;
use crate::common::{ObjectValue, Result};
use crate::coordinator::{CoordinatorService, Lookup};
use async_trait::async_trait;
use std::path::Path;

/// The coordinator's RPC surface
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Lookup>>;
    async fn put(&self, key: &str, value: ObjectValue, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn count(&self) -> Result<usize>;
    async fn select_least_loaded(&self) -> Result<String>;
    async fn register_node(&self, endpoint: &str) -> Result<()>;
    async fn adjust_node_size(&self, key: &str, endpoint: &str, new_size: u64) -> Result<bool>;
    async fn node_loads(&self) -> Result<Vec<NodeLoad>>;
    async fn persist_snapshot(&self, path: &Path) -> Result<usize>;
    async fn load_snapshot(&self, path: &Path) -> Result<usize>;
}

/// The storage nodes' get/put surface, addressed by endpoint
#[async_trait]
pub trait ContentNodes: Send + Sync {
    async fn get(&self, node: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, node: &str, key: &str, bytes: Vec<u8>) -> Result<()>;
}

#[async_trait]
impl MetadataService for CoordinatorService {
    async fn get(&self, key: &str) -> Result<Option<Lookup>> {
        CoordinatorService::get(self, key)
    }

    async fn put(&self, key: &str, value: ObjectValue, ttl_secs: u64) -> Result<()> {
        CoordinatorService::put(self, key, value, ttl_secs)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        CoordinatorService::delete(self, key)
    }

    async fn count(&self) -> Result<usize> {
        CoordinatorService::count(self)
    }

    async fn select_least_loaded(&self) -> Result<String> {
        CoordinatorService::select_least_loaded(self)
    }

    async fn register_node(&self, endpoint: &str) -> Result<()> {
        CoordinatorService::register_node(self, endpoint).map(|_| ())
    }

    async fn adjust_node_size(&self, key: &str, endpoint: &str, new_size: u64) -> Result<bool> {
        CoordinatorService::adjust_node_size(self, key, endpoint, new_size)
    }

    async fn node_loads(&self) -> Result<Vec<NodeLoad>> {
        CoordinatorService::node_loads(self)
    }

    async fn persist_snapshot(&self, path: &Path) -> Result<usize> {
        CoordinatorService::persist_snapshot(self, path)
    }

    async fn load_snapshot(&self, path: &Path) -> Result<usize> {
        CoordinatorService::load_snapshot(self, path)
    }
}
