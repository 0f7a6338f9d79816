//! Storage node: a plain byte-blob store keyed by object key

pub mod http;
pub mod server;
pub mod store;

pub use server::StorageNode;
pub use store::{ContentStore, DiskStore, MemStore};
