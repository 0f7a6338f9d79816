//! HTTP surface of a storage node
//!
//! `GET /blob/{key}` returns the raw bytes or 404; `PUT /blob/{key}` stores
//! the request body and answers only once the store reports it durable.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::types::AckResponse;
use crate::common::{validate_key, Error, MetricsRegistry, Result};
use crate::node::store::ContentStore;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
pub struct NodeState {
    pub store: Arc<dyn ContentStore>,
    pub metrics: Arc<MetricsRegistry>,
    pub endpoint: String,
}

/// Creates the node router; bodies larger than `max_blob_size` get 413.
pub fn create_router(state: NodeState, max_blob_size: usize) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/blob/:key", get(get_blob).put(put_blob))
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_blob_size))
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            request_tracing_middleware,
        ))
        .with_state(state)
}

/// Run a blocking store call off the async workers
async fn with_store<T, F>(state: &NodeState, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ContentStore) -> Result<T> + Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {}", e)))?
}

async fn get_blob(State(state): State<NodeState>, Path(key): Path<String>) -> Result<Response> {
    validate_key(&key)?;
    let lookup = key.clone();
    match with_store(&state, move |store| store.get(&lookup)).await? {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response()),
        None => {
            tracing::debug!(key = %key, "Blob not found");
            Err(Error::NotFound(key))
        }
    }
}

async fn put_blob(
    State(state): State<NodeState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<AckResponse>> {
    validate_key(&key)?;
    let len = body.len();
    let stored = key.clone();
    with_store(&state, move |store| store.put(&stored, &body)).await?;
    tracing::debug!(key = %key, bytes = len, "Blob stored");
    Ok(Json(AckResponse { ok: true }))
}

async fn health(State(state): State<NodeState>) -> Result<impl IntoResponse> {
    let keys = with_store(&state, |store| store.len()).await?;
    Ok(Json(json!({
        "status": "healthy",
        "endpoint": state.endpoint,
        "keys": keys,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn metrics_text(State(state): State<NodeState>) -> Result<String> {
    let mut out = state.metrics.to_prometheus();
    let keys = with_store(&state, |store| store.len()).await?;
    out.push_str("# HELP placekv_node_keys Blobs held by this storage node\n");
    out.push_str("# TYPE placekv_node_keys gauge\n");
    out.push_str(&format!("placekv_node_keys {}\n", keys));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::encode_key;
    use crate::node::store::MemStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn router(max: usize) -> Router {
        create_router(
            NodeState {
                store: Arc::new(MemStore::new()),
                metrics: Arc::new(MetricsRegistry::new()),
                endpoint: "http://n1".into(),
            },
            max,
        )
    }

    fn put(key: &str, body: &'static [u8]) -> Request<Body> {
        Request::put(format!("/blob/{}", encode_key(key)))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_blob() {
        let app = router(1024);
        let response = app.clone().oneshot(put("/dir/a", b"hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get(format!("/blob/{}", encode_key("/dir/a")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_missing_blob_is_404() {
        let app = router(1024);
        let response = app
            .oneshot(Request::get("/blob/%2Fnope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_blob_is_rejected() {
        let app = router(4);
        let response = app.clone().oneshot(put("/big", b"too large")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app
            .oneshot(Request::get("/blob/%2Fbig").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_counts_keys() {
        let app = router(1024);
        app.clone().oneshot(put("/a", b"1")).await.unwrap();
        app.clone().oneshot(put("/b", b"2")).await.unwrap();

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["keys"], 2);
        assert_eq!(health["endpoint"], "http://n1");
    }
}
