//! Placement registry: storage-node endpoints and their aggregate placed bytes
//!
//! New content goes to the node with the fewest aggregate bytes. Nodes are
//! kept in registration order, so ties resolve to the first-registered node.
//! Entries are never removed; expiry and deletion only drive them back down.

use crate::common::types::NodeLoad;
use crate::common::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct NodeEntry {
    endpoint: String,
    aggregate_bytes: u64,
}

/// Result of applying a size delta to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustOutcome {
    pub aggregate_bytes: u64,
    /// The delta would have gone below zero and was clamped
    pub clamped: bool,
}

/// Registry of storage nodes, owned by the coordinator
#[derive(Debug, Default)]
pub struct PlacementRegistry {
    nodes: Vec<NodeEntry>,
    index: HashMap<String, usize>,
}

impl PlacementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with an empty aggregate. Returns false if it was already known.
    pub fn register(&mut self, endpoint: &str) -> bool {
        if self.index.contains_key(endpoint) {
            return false;
        }
        self.index.insert(endpoint.to_string(), self.nodes.len());
        self.nodes.push(NodeEntry {
            endpoint: endpoint.to_string(),
            aggregate_bytes: 0,
        });
        true
    }

    /// Endpoint with the minimum aggregate, first-registered on ties
    pub fn select_least_loaded(&self) -> Result<&str> {
        self.nodes
            .iter()
            .min_by_key(|n| n.aggregate_bytes)
            .map(|n| n.endpoint.as_str())
            .ok_or(Error::NoNodesAvailable)
    }

    /// Add `delta_bytes` to a node's aggregate, clamping at zero.
    ///
    /// A delta against an unknown node registers it first: content that is
    /// already placed there has to be accounted for somewhere.
    pub fn adjust(&mut self, endpoint: &str, delta_bytes: i128) -> AdjustOutcome {
        if !self.index.contains_key(endpoint) {
            tracing::warn!(
                node = %endpoint,
                delta = %delta_bytes,
                "Size adjustment for unregistered node, registering it"
            );
            self.register(endpoint);
        }

        let idx = self.index[endpoint];
        let entry = &mut self.nodes[idx];
        let next = entry.aggregate_bytes as i128 + delta_bytes;

        let clamped = next < 0;
        if clamped {
            tracing::error!(
                node = %endpoint,
                aggregate = entry.aggregate_bytes,
                delta = %delta_bytes,
                "Placement accounting went negative, clamping to zero"
            );
        }
        entry.aggregate_bytes = next.clamp(0, u64::MAX as i128) as u64;

        AdjustOutcome {
            aggregate_bytes: entry.aggregate_bytes,
            clamped,
        }
    }

    pub fn aggregate(&self, endpoint: &str) -> Option<u64> {
        self.index
            .get(endpoint)
            .map(|&idx| self.nodes[idx].aggregate_bytes)
    }

    /// Zero every aggregate, keeping the nodes and their order
    pub fn reset_aggregates(&mut self) {
        for node in &mut self.nodes {
            node.aggregate_bytes = 0;
        }
    }

    /// Endpoints in registration order
    pub fn endpoints(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.endpoint.clone()).collect()
    }

    pub fn loads(&self) -> Vec<NodeLoad> {
        self.nodes
            .iter()
            .map(|n| NodeLoad {
                endpoint: n.endpoint.clone(),
                aggregate_bytes: n.aggregate_bytes,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
