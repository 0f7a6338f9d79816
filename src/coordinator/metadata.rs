//! TTL-indexed metadata table
//!
//! Stores, per key:
//! - the attribute blob (whose `contents` points at the owning storage node)
//! - the declared size used for placement accounting
//! - an absolute expiry (unix milliseconds)
//!
//! Expired records stay physically present until the sweeper removes them,
//! but every lookup here already treats them as absent.

use crate::common::ObjectValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One key's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub key: String,
    pub value: ObjectValue,
    pub declared_size: u64,
    pub expires_at_ms: u64,
}

impl MetadataRecord {
    pub fn new(key: &str, value: ObjectValue, ttl_secs: u64, now_ms: u64) -> Self {
        Self {
            key: key.to_string(),
            declared_size: value.size,
            value,
            expires_at_ms: now_ms.saturating_add(ttl_secs.saturating_mul(1000)),
        }
    }

    pub fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }

    /// Node holding this record's content, with the bytes it accounts for there
    pub fn placement(&self) -> Option<(&str, u64)> {
        self.value
            .placement()
            .map(|node| (node, self.declared_size))
    }

    /// Whole seconds until expiry
    pub fn ttl_remaining_secs(&self, now_ms: u64) -> u64 {
        self.expires_at_ms.saturating_sub(now_ms) / 1000
    }
}

/// Metadata table
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: HashMap<String, MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live record for `key`
    pub fn get(&self, key: &str, now_ms: u64) -> Option<&MetadataRecord> {
        self.records.get(key).filter(|r| r.is_live(now_ms))
    }

    pub fn get_mut(&mut self, key: &str, now_ms: u64) -> Option<&mut MetadataRecord> {
        self.records.get_mut(key).filter(|r| r.is_live(now_ms))
    }

    /// Store a record, returning whatever was physically there before (live or not)
    pub fn insert(&mut self, record: MetadataRecord) -> Option<MetadataRecord> {
        self.records.insert(record.key.clone(), record)
    }

    /// Physically remove a record, live or not
    pub fn remove(&mut self, key: &str) -> Option<MetadataRecord> {
        self.records.remove(key)
    }

    /// Keys whose expiry has passed
    pub fn expired_keys(&self, now_ms: u64) -> Vec<String> {
        self.records
            .values()
            .filter(|r| !r.is_live(now_ms))
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn live_count(&self, now_ms: u64) -> usize {
        self.records.values().filter(|r| r.is_live(now_ms)).count()
    }

    /// Live records sorted by key
    pub fn live_records(&self, now_ms: u64) -> Vec<MetadataRecord> {
        let mut records: Vec<MetadataRecord> = self
            .records
            .values()
            .filter(|r| r.is_live(now_ms))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    /// Physically stored records, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
