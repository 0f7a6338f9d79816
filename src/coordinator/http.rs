//! HTTP RPC surface of the coordinator
//!
//! Keys are carried percent-encoded in a single path segment, so the root
//! key `/` travels as `/meta/%2F`.

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::types::{
    AckResponse, AdjustRequest, CountResponse, GetResponse, NodeLoad, PutRequest,
    RegisterRequest, SelectResponse, SnapshotRequest, SnapshotResponse,
};
use crate::common::{Error, Result};
use crate::coordinator::service::CoordinatorService;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Clone)]
pub struct CoordState {
    pub service: Arc<CoordinatorService>,
}

/// Creates the HTTP router with all coordinator endpoints.
pub fn create_router(state: CoordState) -> Router {
    let metrics = state.service.metrics().clone();
    Router::new()
        // Metadata
        .route(
            "/meta/:key",
            get(get_meta).put(put_meta).delete(delete_meta),
        )
        .route("/count", get(count))
        // Placement
        .route("/nodes", get(list_nodes).post(register_node))
        .route("/nodes/select", get(select_node))
        .route("/nodes/adjust", post(adjust_node_size))
        // Operator backup/restore
        .route("/admin/snapshot/persist", post(persist_snapshot))
        .route("/admin/snapshot/load", post(load_snapshot))
        // Diagnostics
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            request_tracing_middleware,
        ))
        .with_state(state)
}

async fn get_meta(
    State(state): State<CoordState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let response = match state.service.get(&key)? {
        Some(lookup) => GetResponse {
            value: Some(lookup.value),
            ttl: Some(lookup.ttl_secs),
        },
        None => GetResponse::default(),
    };
    Ok(Json(response))
}

async fn put_meta(
    State(state): State<CoordState>,
    Path(key): Path<String>,
    Json(req): Json<PutRequest>,
) -> Result<Json<AckResponse>> {
    state.service.put(&key, req.value, req.ttl_secs)?;
    Ok(Json(AckResponse { ok: true }))
}

async fn delete_meta(
    State(state): State<CoordState>,
    Path(key): Path<String>,
) -> Result<Json<AckResponse>> {
    let removed = state.service.delete(&key)?;
    Ok(Json(AckResponse { ok: removed }))
}

async fn count(State(state): State<CoordState>) -> Result<Json<CountResponse>> {
    Ok(Json(CountResponse {
        count: state.service.count()?,
    }))
}

async fn register_node(
    State(state): State<CoordState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AckResponse>> {
    state.service.register_node(&req.endpoint)?;
    Ok(Json(AckResponse { ok: true }))
}

async fn list_nodes(State(state): State<CoordState>) -> Result<Json<Vec<NodeLoad>>> {
    Ok(Json(state.service.node_loads()?))
}

async fn select_node(State(state): State<CoordState>) -> Result<Json<SelectResponse>> {
    Ok(Json(SelectResponse {
        endpoint: state.service.select_least_loaded()?,
    }))
}

async fn adjust_node_size(
    State(state): State<CoordState>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<AckResponse>> {
    let ok = state
        .service
        .adjust_node_size(&req.key, &req.endpoint, req.new_size)?;
    Ok(Json(AckResponse { ok }))
}

async fn persist_snapshot(
    State(state): State<CoordState>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<SnapshotResponse>> {
    let service = state.service.clone();
    let records = tokio::task::spawn_blocking(move || service.persist_snapshot(&req.path))
        .await
        .map_err(|e| Error::Internal(format!("snapshot task failed: {}", e)))??;
    Ok(Json(SnapshotResponse { ok: true, records }))
}

async fn load_snapshot(
    State(state): State<CoordState>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<SnapshotResponse>> {
    let service = state.service.clone();
    let records = tokio::task::spawn_blocking(move || service.load_snapshot(&req.path))
        .await
        .map_err(|e| Error::Internal(format!("snapshot task failed: {}", e)))??;
    Ok(Json(SnapshotResponse { ok: true, records }))
}

/// Health check endpoint
async fn health(State(state): State<CoordState>) -> Result<impl IntoResponse> {
    let nodes = state.service.node_loads()?;
    Ok(Json(json!({
        "status": "healthy",
        "storage_nodes": nodes.len(),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Prometheus metrics, including every node's aggregate bytes
async fn metrics_text(State(state): State<CoordState>) -> Result<impl IntoResponse> {
    let mut out = state.service.metrics().to_prometheus();
    let nodes = state.service.node_loads()?;

    out.push_str("# HELP placekv_node_aggregate_bytes Declared bytes placed on each storage node\n");
    out.push_str("# TYPE placekv_node_aggregate_bytes gauge\n");
    for node in &nodes {
        let _ = writeln!(
            out,
            "placekv_node_aggregate_bytes{{node=\"{}\"}} {}",
            node.endpoint, node.aggregate_bytes
        );
    }
    let _ = writeln!(out, "placekv_storage_nodes {}", nodes.len());

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{encode_key, Contents, ErrorBody, ObjectValue};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn router() -> (Router, Arc<CoordinatorService>) {
        let service = Arc::new(CoordinatorService::new(Duration::from_secs(300)));
        let router = create_router(CoordState {
            service: service.clone(),
        });
        (router, service)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_over_http() {
        let (app, service) = router();
        service.register_node("http://n1").unwrap();

        let value = ObjectValue {
            size: 5,
            contents: Contents::Placement("http://n1".into()),
            ..Default::default()
        };
        let uri = format!("/meta/{}", encode_key("/a"));
        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &uri,
                serde_json::to_value(PutRequest {
                    value: value.clone(),
                    ttl_secs: 60,
                })
                .unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let got: GetResponse = body_json(response).await;
        assert_eq!(got.value, Some(value));
        assert!(got.ttl.unwrap() >= 59);
    }

    #[tokio::test]
    async fn test_absent_key_is_empty_mapping() {
        let (app, _) = router();
        let response = app
            .oneshot(
                Request::get(format!("/meta/{}", encode_key("/missing")))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"{}");
    }

    #[tokio::test]
    async fn test_select_without_nodes_is_503() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::get("/nodes/select").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.kind, "no_nodes_available");
    }

    #[tokio::test]
    async fn test_register_and_list_nodes() {
        let (app, _) = router();
        for endpoint in ["http://n1", "http://n2", "http://n1"] {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/nodes",
                    json!({ "endpoint": endpoint }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(Request::get("/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let nodes: Vec<NodeLoad> = body_json(response).await;
        assert_eq!(nodes.len(), 2);

        let response = app
            .oneshot(Request::get("/nodes/select").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let selected: SelectResponse = body_json(response).await;
        assert_eq!(selected.endpoint, "http://n1");
    }

    #[tokio::test]
    async fn test_metrics_lists_node_aggregates() {
        let (app, service) = router();
        service.register_node("http://n1").unwrap();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("placekv_node_aggregate_bytes{node=\"http://n1\"} 0"));
    }
}
