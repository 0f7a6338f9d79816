//! Common utilities and types shared across placekv

pub mod config;
pub mod error;
pub mod metrics;
pub mod serve;
pub mod tracing_middleware;
pub mod types;
pub mod utils;

pub use config::{Config, CoordinatorConfig, NodeConfig, ProxyConfig, TlsConfig};
pub use error::{Error, ErrorBody, Result};
pub use metrics::MetricsRegistry;
pub use types::{Contents, ObjectValue, ROOT_KEY};
pub use utils::{encode_key, format_bytes, parse_duration, retry_with_backoff, timestamp_now_millis, validate_key};
