//! Error types for placekv

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Metadata Errors ===
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Dangling metadata: {key} points at {node}, which does not hold it")]
    DanglingMetadata { key: String, node: String },

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    // === Placement Errors ===
    #[error("No storage nodes available")]
    NoNodesAvailable,

    // === Network Errors ===
    #[error("Storage node {node} unavailable: {reason}")]
    StorageUnavailable { node: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // === Request / Config Errors ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error payload carried over the wire between coordinator, nodes and proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionFailed(_)
                | Error::StorageUnavailable { .. }
                | Error::NoNodesAvailable
        )
    }

    /// Stable wire name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::DanglingMetadata { .. } => "dangling_metadata",
            Error::NoNodesAvailable => "no_nodes_available",
            Error::StorageUnavailable { .. } => "storage_unavailable",
            Error::ConnectionFailed(_) => "connection_failed",
            Error::Timeout(_) => "timeout",
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => "invalid_argument",
            Error::Corrupted(_) => "corrupted",
            _ => "internal",
        }
    }

    /// Rebuild a typed error from a wire payload
    pub fn from_wire(body: ErrorBody) -> Self {
        match body.kind.as_str() {
            "not_found" => Error::NotFound(body.message),
            "no_nodes_available" => Error::NoNodesAvailable,
            "storage_unavailable" => Error::StorageUnavailable {
                node: String::new(),
                reason: body.message,
            },
            "dangling_metadata" => Error::DanglingMetadata {
                key: String::new(),
                node: body.message,
            },
            "connection_failed" => Error::ConnectionFailed(body.message),
            "timeout" => Error::Timeout(body.message),
            "invalid_argument" => Error::InvalidArgument(body.message),
            "corrupted" => Error::Corrupted(body.message),
            _ => Error::Internal(body.message),
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::NoNodesAvailable | Error::StorageUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::DanglingMetadata { .. } | Error::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Error::ConnectionFailed(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_kind_round_trip() {
        let err = Error::NoNodesAvailable;
        let body = ErrorBody {
            kind: err.kind().to_string(),
            message: err.to_string(),
        };
        assert!(matches!(Error::from_wire(body), Error::NoNodesAvailable));

        let body = ErrorBody {
            kind: "something_new".into(),
            message: "boom".into(),
        };
        assert!(matches!(Error::from_wire(body), Error::Internal(m) if m == "boom"));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            Error::NotFound("k".into()).to_http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::NoNodesAvailable.to_http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::DanglingMetadata {
                key: "/a".into(),
                node: "http://n1".into()
            }
            .to_http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout("rpc".into()).is_retryable());
        assert!(Error::NoNodesAvailable.is_retryable());
        assert!(!Error::NotFound("k".into()).is_retryable());
        assert!(!Error::DanglingMetadata {
            key: "/a".into(),
            node: "n".into()
        }
        .is_retryable());
    }
}
