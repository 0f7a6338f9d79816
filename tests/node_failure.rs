//! Storage-node failures must never leave metadata pointing at missing content

mod common;

use axum::{
    routing::{get, put},
    Router,
};
use common::*;
use placekv::node::DiskStore;
use placekv::{CoordinatorService, Error, ObjectValue};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_unreachable_node_aborts_put() {
    let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
    // nothing listens on the discard port
    service.register_node("http://127.0.0.1:9").unwrap();
    let proxy = proxy(&spawn_coordinator(service.clone()).await);

    let err = proxy
        .put("/a", ObjectValue::with_data("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }), "got {err}");

    assert_eq!(proxy.get("/a").await.unwrap(), None);
    assert_eq!(proxy.count().await.unwrap(), 1);
    assert_eq!(aggregate(&service, "http://127.0.0.1:9"), 0);
}

#[tokio::test]
async fn test_slow_node_times_out_without_commit() {
    let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
    let slow = Router::new().route(
        "/blob/:key",
        put(|| async {
            tokio::time::sleep(RPC_TIMEOUT * 4).await;
            "{\"ok\":true}"
        }),
    );
    let node = spawn(slow).await;
    service.register_node(&node).unwrap();
    let proxy = proxy(&spawn_coordinator(service.clone()).await);

    let err = proxy
        .put("/a", ObjectValue::with_data("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }), "got {err}");
    assert!(service.get("/a").unwrap().is_none());
    assert_eq!(aggregate(&service, &node), 0);
}

#[tokio::test]
async fn test_failing_node_keeps_previous_version() {
    let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
    let dir = tempfile::tempdir().unwrap();
    let node = spawn_node(&service, Arc::new(DiskStore::open(dir.path()).unwrap())).await;
    let proxy = proxy(&spawn_coordinator(service.clone()).await);
    proxy.put("/a", ObjectValue::with_data("v1")).await.unwrap();

    // oversized bodies are refused by the node
    let err = proxy
        .put("/a", ObjectValue::with_data(vec![0u8; 2 * 1024 * 1024]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }), "got {err}");

    let got = proxy.get("/a").await.unwrap().unwrap();
    assert_eq!(got.data(), Some(&b"v1"[..]));
    assert_eq!(aggregate(&service, &node), 2);
}

#[tokio::test]
async fn test_lost_content_reports_dangling_metadata() {
    let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
    let dir = tempfile::tempdir().unwrap();
    let node = spawn_node(&service, Arc::new(DiskStore::open(dir.path()).unwrap())).await;
    let proxy = proxy(&spawn_coordinator(service.clone()).await);
    proxy.put("/a", ObjectValue::with_data("hello")).await.unwrap();

    // wipe the node's disk behind its back
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        std::fs::remove_dir_all(entry.unwrap().path()).unwrap();
    }

    let err = proxy.get("/a").await.unwrap_err();
    assert!(
        matches!(err, Error::DanglingMetadata { node: ref n, .. } if *n == node),
        "got {err}"
    );
    // metadata-only queries still succeed
    assert!(proxy.contains("/a").await.unwrap());
}

#[tokio::test]
async fn test_no_nodes_available() {
    let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
    let proxy = proxy(&spawn_coordinator(service.clone()).await);

    let err = proxy
        .put("/a", ObjectValue::with_data("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoNodesAvailable), "got {err}");
}

#[tokio::test]
async fn test_unreachable_coordinator_is_connection_failure() {
    let proxy = proxy("http://127.0.0.1:9");
    let err = proxy.get("/a").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)), "got {err}");
}

#[tokio::test]
async fn test_hung_coordinator_is_connection_failure() {
    let hung = Router::new().route(
        "/meta/:key",
        get(|| async {
            tokio::time::sleep(RPC_TIMEOUT * 4).await;
            "{}"
        }),
    );
    let proxy = proxy(&spawn(hung).await);

    let err = proxy.get("/a").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)), "got {err}");
    let err = proxy.contains("/a").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed(_)), "got {err}");
}
