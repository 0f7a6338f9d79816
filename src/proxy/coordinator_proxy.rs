//! Two-phase object access on top of the coordinator and storage nodes
//!
//! A put ships the payload to a storage node first and only then commits the
//! metadata that points at it. If the node write fails or times out, nothing
//! is committed. A crash between the two phases can orphan content on a
//! node, but can never publish metadata whose content was not stored.
//!
//! The root key `/` is the exception: its value (including the directory
//! listing) lives entirely in the coordinator and no storage node is touched.

use crate::common::{
    validate_key, Contents, Error, ObjectValue, ProxyConfig, Result, ROOT_KEY,
};
use crate::proxy::client::{build_http_client, CoordinatorClient, HttpNodes};
use crate::proxy::{ContentNodes, MetadataService};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct CoordinatorProxy {
    metadata: Arc<dyn MetadataService>,
    nodes: Arc<dyn ContentNodes>,
    rpc_timeout: Duration,
    default_ttl_secs: u64,
}

impl CoordinatorProxy {
    pub fn new(
        metadata: Arc<dyn MetadataService>,
        nodes: Arc<dyn ContentNodes>,
        rpc_timeout: Duration,
        default_ttl_secs: u64,
    ) -> Self {
        Self {
            metadata,
            nodes,
            rpc_timeout,
            default_ttl_secs,
        }
    }

    /// Proxy talking HTTP to the configured coordinator and to whichever
    /// storage nodes it hands out
    pub fn connect(config: &ProxyConfig) -> Result<Self> {
        let coordinator = CoordinatorClient::from_config(config)?;
        let http = build_http_client(config.rpc_timeout(), config.ca_cert_path.as_deref())?;
        Ok(Self::new(
            Arc::new(coordinator),
            Arc::new(HttpNodes::new(http)),
            config.rpc_timeout(),
            config.default_ttl_secs,
        ))
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataService> {
        &self.metadata
    }

    /// Bound a coordinator call. Running out of time, whether here or inside
    /// the transport, and transport-level failures are connectivity failures.
    async fn meta_call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let result = tokio::time::timeout(self.rpc_timeout, call)
            .await
            .map_err(|_| {
                Error::ConnectionFailed(format!(
                    "coordinator did not answer within {:?}",
                    self.rpc_timeout
                ))
            })?;
        result.map_err(|e| match e {
            Error::Timeout(msg) | Error::Http(msg) => {
                Error::ConnectionFailed(format!("coordinator: {}", msg))
            }
            other => other,
        })
    }

    /// Bound a storage node call; running out of time is a failed write or read
    async fn node_call<T>(&self, node: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.rpc_timeout, call)
            .await
            .map_err(|_| Error::StorageUnavailable {
                node: node.to_string(),
                reason: format!("no answer within {:?}", self.rpc_timeout),
            })?
    }

    /// The value stored under `key` with its payload filled in, or `None`
    /// when the key is absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<ObjectValue>> {
        validate_key(key)?;
        let Some(lookup) = self.meta_call(self.metadata.get(key)).await? else {
            return Ok(None);
        };
        let mut value = lookup.value;

        if key == ROOT_KEY {
            return Ok(Some(value));
        }

        let Some(node) = value.placement().map(str::to_string) else {
            tracing::warn!(key = %key, "Metadata has no placement");
            return Err(Error::DanglingMetadata {
                key: key.to_string(),
                node: "<unplaced>".to_string(),
            });
        };

        match self.node_call(&node, self.nodes.get(&node, key)).await? {
            Some(bytes) => {
                value.contents = Contents::Data(bytes);
                Ok(Some(value))
            }
            None => {
                tracing::warn!(key = %key, node = %node, "Storage node does not hold committed key");
                Err(Error::DanglingMetadata {
                    key: key.to_string(),
                    node,
                })
            }
        }
    }

    /// Store `value` under `key` with the configured default TTL
    pub async fn put(&self, key: &str, value: ObjectValue) -> Result<()> {
        self.put_with_ttl(key, value, self.default_ttl_secs).await
    }

    /// Store `value` under `key`: content to a storage node, then metadata.
    ///
    /// An existing key keeps its storage node; a new key goes to the least
    /// loaded one.
    pub async fn put_with_ttl(&self, key: &str, mut value: ObjectValue, ttl_secs: u64) -> Result<()> {
        validate_key(key)?;

        if key == ROOT_KEY {
            return self.meta_call(self.metadata.put(key, value, ttl_secs)).await;
        }

        let payload = value.take_payload()?;

        let prior = self.meta_call(self.metadata.get(key)).await?;
        let node = match prior.as_ref().and_then(|lookup| lookup.value.placement()) {
            Some(node) => node.to_string(),
            None => self.meta_call(self.metadata.select_least_loaded()).await?,
        };

        let len = payload.len();
        if let Err(e) = self
            .node_call(&node, self.nodes.put(&node, key, payload))
            .await
        {
            tracing::warn!(key = %key, node = %node, "Content write failed, metadata not committed: {}", e);
            return Err(e);
        }
        tracing::debug!(key = %key, node = %node, bytes = len, "Content stored");

        value.contents = Contents::Placement(node);
        self.meta_call(self.metadata.put(key, value, ttl_secs)).await
    }

    /// Remove the metadata for `key`. Returns whether a live record existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.meta_call(self.metadata.delete(key)).await
    }

    /// Whether a live record exists; never contacts a storage node
    pub async fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.meta_call(self.metadata.get(key)).await?.is_some())
    }

    pub async fn count(&self) -> Result<usize> {
        self.meta_call(self.metadata.count()).await
    }
}
