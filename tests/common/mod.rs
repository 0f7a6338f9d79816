//! In-process cluster helpers: real HTTP servers on ephemeral ports

#![allow(dead_code)]

use axum::Router;
use placekv::common::{MetricsRegistry, ProxyConfig};
use placekv::coordinator::http::{create_router, CoordState};
use placekv::node::http::{create_router as node_router, NodeState};
use placekv::node::{ContentStore, MemStore};
use placekv::{CoordinatorProxy, CoordinatorService};
use std::sync::Arc;
use std::time::Duration;

pub const RPC_TIMEOUT: Duration = Duration::from_millis(500);

/// Serve `router` on 127.0.0.1:0 and return its base URL
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub async fn spawn_coordinator(service: Arc<CoordinatorService>) -> String {
    spawn(create_router(CoordState { service })).await
}

/// Start a storage node over `store` and register it with `service`
pub async fn spawn_node(service: &CoordinatorService, store: Arc<dyn ContentStore>) -> String {
    let router = node_router(
        NodeState {
            store,
            metrics: Arc::new(MetricsRegistry::new()),
            endpoint: String::new(),
        },
        1024 * 1024,
    );
    let url = spawn(router).await;
    service.register_node(&url).unwrap();
    url
}

pub async fn spawn_mem_node(service: &CoordinatorService) -> String {
    spawn_node(service, Arc::new(MemStore::new())).await
}

/// Proxy talking HTTP to the coordinator at `coordinator_url`
pub fn proxy(coordinator_url: &str) -> CoordinatorProxy {
    CoordinatorProxy::connect(&ProxyConfig {
        coordinator_url: coordinator_url.to_string(),
        rpc_timeout_ms: RPC_TIMEOUT.as_millis() as u64,
        default_ttl_secs: 600,
        ca_cert_path: None,
    })
    .unwrap()
}

pub fn aggregate(service: &CoordinatorService, node: &str) -> u64 {
    service
        .node_loads()
        .unwrap()
        .into_iter()
        .find(|n| n.endpoint == node)
        .map(|n| n.aggregate_bytes)
        .unwrap()
}
