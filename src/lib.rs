//! # placekv
//!
//! A small distributed object store built from three parts:
//! - a coordinator holding TTL-bounded metadata and per-node placement load
//! - storage nodes holding raw content, one blob per key
//! - a client-side proxy that writes content first and commits metadata second
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!               ┌──────────────────────────────┐
//!               │         Coordinator          │
//!               │  metadata (TTL) + placement  │
//!               │  lazy expiration sweeps      │
//!               └──────────────▲───────────────┘
//!                   (2) commit │ metadata
//!                              │
//!   ┌──────────────────────────┴───┐
//!   │        CoordinatorProxy       │
//!   │  get / put / delete / count  │
//!   └──────┬─────────────┬─────────┘
//!          │ (1) content │
//!   ┌──────▼─────┐ ┌─────▼──────┐
//!   │  Node 1    │ │  Node 2    │  ...
//!   └────────────┘ └────────────┘
//! ```
//!
//! The root key `/` is held entirely by the coordinator.
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! placekv-coord serve --bind 0.0.0.0:8443 --sweep-interval 5m --snapshot ./coord/meta.json
//! ```
//!
//! ### Start storage nodes
//! ```bash
//! placekv-node serve --bind 0.0.0.0:9000 --data ./node-1 --coordinator http://localhost:8443
//! ```
//!
//! ### Use the CLI
//! ```bash
//! placekv put /docs/a.txt --file ./a.txt
//! placekv get /docs/a.txt --output ./out.txt
//! placekv count
//! placekv nodes
//! placekv snapshot persist ./backup.json
//! ```

pub mod common;
pub mod coordinator;
pub mod node;
pub mod proxy;

// Re-export commonly used types
pub use common::{Config, Contents, Error, ObjectValue, Result, ROOT_KEY};
pub use coordinator::{Coordinator, CoordinatorService};
pub use node::StorageNode;
pub use proxy::CoordinatorProxy;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
