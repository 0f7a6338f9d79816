//! HTTP clients for the coordinator and the storage nodes

use crate::common::types::{
    AckResponse, AdjustRequest, CountResponse, GetResponse, NodeLoad, PutRequest,
    RegisterRequest, SelectResponse, SnapshotRequest, SnapshotResponse,
};
use crate::common::{encode_key, Error, ErrorBody, ObjectValue, ProxyConfig, Result};
use crate::coordinator::Lookup;
use crate::proxy::{ContentNodes, MetadataService};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// Build a client whose every request is bounded by `timeout`.
/// `ca_cert` adds a PEM trust root for self-signed deployments.
pub fn build_http_client(timeout: Duration, ca_cert: Option<&Path>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout);

    if let Some(path) = ca_cert {
        let pem = std::fs::read(path)?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| Error::InvalidConfig(format!("bad CA certificate {:?}: {}", path, e)))?;
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| Error::InvalidConfig(format!("HTTP client: {}", e)))
}

/// Turn a coordinator response into `T`, or into the typed error it carries
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.json::<ErrorBody>().await.unwrap_or_else(|_| ErrorBody {
        kind: "internal".to_string(),
        message: format!("unexpected status {}", status),
    });
    Err(Error::from_wire(body))
}

/// Client for the coordinator RPC surface
#[derive(Clone)]
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let http = build_http_client(config.rpc_timeout(), config.ca_cert_path.as_deref())?;
        Ok(Self::new(&config.coordinator_url, http))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn meta_url(&self, key: &str) -> String {
        self.url(&format!("/meta/{}", encode_key(key)))
    }
}

#[async_trait]
impl MetadataService for CoordinatorClient {
    async fn get(&self, key: &str) -> Result<Option<Lookup>> {
        let response = self.http.get(self.meta_url(key)).send().await?;
        let body: GetResponse = decode(response).await?;
        Ok(body.value.map(|value| Lookup {
            value,
            ttl_secs: body.ttl.unwrap_or(0),
        }))
    }

    async fn put(&self, key: &str, value: ObjectValue, ttl_secs: u64) -> Result<()> {
        let response = self
            .http
            .put(self.meta_url(key))
            .json(&PutRequest { value, ttl_secs })
            .send()
            .await?;
        let ack: AckResponse = decode(response).await?;
        if !ack.ok {
            return Err(Error::Internal(format!("coordinator refused commit of {}", key)));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self.http.delete(self.meta_url(key)).send().await?;
        let ack: AckResponse = decode(response).await?;
        Ok(ack.ok)
    }

    async fn count(&self) -> Result<usize> {
        let response = self.http.get(self.url("/count")).send().await?;
        let body: CountResponse = decode(response).await?;
        Ok(body.count)
    }

    async fn select_least_loaded(&self) -> Result<String> {
        let response = self.http.get(self.url("/nodes/select")).send().await?;
        let body: SelectResponse = decode(response).await?;
        Ok(body.endpoint)
    }

    async fn register_node(&self, endpoint: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url("/nodes"))
            .json(&RegisterRequest {
                endpoint: endpoint.to_string(),
            })
            .send()
            .await?;
        let _: AckResponse = decode(response).await?;
        Ok(())
    }

    async fn adjust_node_size(&self, key: &str, endpoint: &str, new_size: u64) -> Result<bool> {
        let response = self
            .http
            .post(self.url("/nodes/adjust"))
            .json(&AdjustRequest {
                key: key.to_string(),
                endpoint: endpoint.to_string(),
                new_size,
            })
            .send()
            .await?;
        let ack: AckResponse = decode(response).await?;
        Ok(ack.ok)
    }

    async fn node_loads(&self) -> Result<Vec<NodeLoad>> {
        let response = self.http.get(self.url("/nodes")).send().await?;
        decode(response).await
    }

    async fn persist_snapshot(&self, path: &Path) -> Result<usize> {
        let response = self
            .http
            .post(self.url("/admin/snapshot/persist"))
            .json(&SnapshotRequest {
                path: path.to_path_buf(),
            })
            .send()
            .await?;
        let body: SnapshotResponse = decode(response).await?;
        Ok(body.records)
    }

    async fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let response = self
            .http
            .post(self.url("/admin/snapshot/load"))
            .json(&SnapshotRequest {
                path: path.to_path_buf(),
            })
            .send()
            .await?;
        let body: SnapshotResponse = decode(response).await?;
        Ok(body.records)
    }
}

/// Client for storage nodes; the endpoint is the node's base URL
#[derive(Clone)]
pub struct HttpNodes {
    http: reqwest::Client,
}

impl HttpNodes {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn blob_url(node: &str, key: &str) -> String {
        format!("{}/blob/{}", node.trim_end_matches('/'), encode_key(key))
    }

    fn unavailable(node: &str, reason: impl std::fmt::Display) -> Error {
        Error::StorageUnavailable {
            node: node.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ContentNodes for HttpNodes {
    async fn get(&self, node: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .http
            .get(Self::blob_url(node, key))
            .send()
            .await
            .map_err(|e| Self::unavailable(node, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Self::unavailable(node, e))?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(Self::unavailable(node, format!("GET returned {}", status))),
        }
    }

    async fn put(&self, node: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .put(Self::blob_url(node, key))
            .body(bytes)
            .send()
            .await
            .map_err(|e| Self::unavailable(node, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unavailable(node, format!("PUT returned {}", status)));
        }
        let ack: AckResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable(node, e))?;
        if !ack.ok {
            return Err(Self::unavailable(node, "node refused the write"));
        }
        Ok(())
    }
}
