//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Metadata management (key → attribute blob, declared size, expiry)
//! - Placement decisions (least-loaded storage node)
//! - Size accounting as objects grow, shrink, expire or are deleted
//! - Lazy expiration sweeps
//! - Snapshot dump/restore of the metadata table

pub mod http;
pub mod metadata;
pub mod placement;
pub mod server;
pub mod service;
pub mod sweeper;

pub use server::Coordinator;
pub use service::{CoordinatorService, Lookup};
