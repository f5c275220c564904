/*!
The snapshot boundary.

A `Snapshot` is what one collection session produced: the node table, any links the
mesh reported itself, and the packet-level routing log. Raw input is validated here
before anything downstream sees it; a malformed snapshot is rejected as a whole.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::network::{
    link::Link,
    node::{NodeId, NodeRecord},
    routing::{RoutingObservation, RoutingPathWire},
    time::Timestamp,
};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Snapshot is not a mapping")]
    NotAMapping,
    #[error("Snapshot has no `nodes` key")]
    MissingNodes,
    #[error("Snapshot `nodes` is not a mapping")]
    NodesNotAMapping,
    #[error("Node record {0} is not a mapping")]
    NodeNotAMapping(String),
    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_device: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct Snapshot {
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    pub connections: Vec<Link>,
    pub routing_paths: Vec<RoutingObservation>,
    pub metadata: SnapshotMetadata,
}

impl TryFrom<Value> for Snapshot {
    type Error = SnapshotError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Snapshot::from_value(value)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    value: Value,
    context: impl Into<String>,
) -> Result<T, SnapshotError> {
    serde_json::from_value(value).map_err(|source| SnapshotError::Decode {
        context: context.into(),
        source,
    })
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(text).map_err(SnapshotError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Validates and decodes a raw snapshot. Either the whole snapshot decodes or an
    /// error is returned; nothing is partially built.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let Value::Object(mut map) = value else {
            return Err(SnapshotError::NotAMapping);
        };
        let raw_nodes = map.remove("nodes").ok_or(SnapshotError::MissingNodes)?;
        let Value::Object(raw_nodes) = raw_nodes else {
            return Err(SnapshotError::NodesNotAMapping);
        };

        let mut nodes = BTreeMap::new();
        for (key, raw) in raw_nodes {
            if !raw.is_object() {
                return Err(SnapshotError::NodeNotAMapping(key));
            }
            let mut record: NodeRecord = decode(raw, format!("node {key}"))?;
            if !record.id.as_str().is_empty() && record.id.as_str() != key {
                debug!("Node record id {} differs from its key {}, using the key", record.id, key);
            }
            record.id = NodeId::new(key);
            nodes.insert(record.id.clone(), record);
        }

        let connections: Vec<Link> = match map.remove("connections") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => decode(raw, "connections")?,
        };

        let routing_paths = match map.remove("routing_paths") {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => {
                let wire: Vec<RoutingPathWire> = decode(raw, "routing_paths")?;
                let total = wire.len();
                let observations: Vec<RoutingObservation> =
                    wire.into_iter().filter_map(RoutingPathWire::into_observation).collect();
                if observations.len() < total {
                    debug!(
                        "Skipped {} routing paths without both endpoints",
                        total - observations.len()
                    );
                }
                observations
            }
        };

        let metadata = match map.remove("metadata") {
            None | Some(Value::Null) => SnapshotMetadata::default(),
            Some(raw) => decode(raw, "metadata")?,
        };

        let mut snapshot = Snapshot { nodes, connections: Vec::new(), routing_paths, metadata };
        snapshot.set_connections(connections);
        Ok(snapshot)
    }

    pub fn insert_node(&mut self, record: NodeRecord) {
        self.nodes.insert(record.id.clone(), record);
    }

    pub fn with_node(mut self, record: NodeRecord) -> Self {
        self.insert_node(record);
        self
    }

    pub fn with_observation(mut self, observation: RoutingObservation) -> Self {
        self.routing_paths.push(observation);
        self
    }

    /// Replaces the snapshot's links, dropping any whose endpoints are unknown.
    pub fn set_connections(&mut self, links: Vec<Link>) {
        let total = links.len();
        self.connections = links
            .into_iter()
            .filter(|link| self.nodes.contains_key(&link.from) && self.nodes.contains_key(&link.to))
            .collect();
        if self.connections.len() < total {
            debug!("Dropped {} dangling links", total - self.connections.len());
        }
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Instant used to stamp links inferred from this snapshot: the collection time,
    /// else the newest `lastHeard`, else the Unix epoch.
    pub fn reference_time(&self) -> Timestamp {
        self.metadata
            .collection_time
            .or_else(|| self.nodes.values().filter_map(|n| n.last_heard).max())
            .unwrap_or(Timestamp::UNIX_EPOCH)
    }
}
