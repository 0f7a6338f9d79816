//! Shared value model and the JSON messages exchanged over the coordinator RPC surface

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The reserved root key. Its metadata is self-contained and never delegates content.
pub const ROOT_KEY: &str = "/";

/// What a value's `contents` field currently holds.
///
/// Callers hand the proxy `Data`; the coordinator's copy holds `Placement`,
/// a pointer to the storage node that owns the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Contents {
    #[default]
    Empty,
    Data(#[serde(with = "base64_bytes")] Vec<u8>),
    Placement(String),
    /// Directory listing, stored inline under the root key
    Listing(Vec<String>),
}

/// Opaque attribute blob attached to a key.
///
/// Only `size` and `contents` mean anything to the core; `attrs` carries
/// whatever the filesystem layer keeps (mode bits, timestamps, link counts, xattrs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectValue {
    /// Declared size used for placement accounting
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub contents: Contents,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl ObjectValue {
    /// A regular object whose declared size is the payload length
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            contents: Contents::Data(data),
            attrs: BTreeMap::new(),
        }
    }

    /// A directory-style value holding its listing inline
    pub fn directory(entries: Vec<String>) -> Self {
        Self {
            size: 0,
            contents: Contents::Listing(entries),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Storage node holding this key's content, if the value is a coordinator-side pointer
    pub fn placement(&self) -> Option<&str> {
        match &self.contents {
            Contents::Placement(node) => Some(node),
            _ => None,
        }
    }

    /// Payload bytes, if the value carries them
    pub fn data(&self) -> Option<&[u8]> {
        match &self.contents {
            Contents::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Move the payload out of the value so it can be shipped to a storage node.
    pub fn take_payload(&mut self) -> crate::Result<Vec<u8>> {
        match std::mem::take(&mut self.contents) {
            Contents::Data(bytes) => Ok(bytes),
            Contents::Empty => Ok(Vec::new()),
            other => {
                self.contents = other;
                Err(crate::Error::InvalidArgument(
                    "only payload contents can be placed on a storage node".into(),
                ))
            }
        }
    }
}

/// `GET /meta/{key}`: an empty object when the key is absent or expired
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ObjectValue>,
    /// Whole seconds left before expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// `PUT /meta/{key}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub value: ObjectValue,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

/// `POST /nodes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub endpoint: String,
}

/// `GET /nodes/select`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResponse {
    pub endpoint: String,
}

/// `POST /nodes/adjust`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustRequest {
    pub key: String,
    pub endpoint: String,
    pub new_size: u64,
}

/// One row of `GET /nodes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLoad {
    pub endpoint: String,
    pub aggregate_bytes: u64,
}

/// `POST /admin/snapshot/{persist,load}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRequest {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub ok: bool,
    pub records: usize,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
