use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::time::Timestamp;

/// `hopsAway` value reported for the collecting application itself.
pub const COLLECTION_SOURCE_HOPS: i32 = -1;
/// `hopsAway` value of the node physically bridged to the collector.
pub const BRIDGE_HOPS: i32 = 0;

/// Opaque identifier of a radio node, e.g. `!a1b2c3d4`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable UUID for renderers that key their vertices by UUID.
    pub fn to_uuidv5(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.0.as_bytes())
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Position { latitude: Some(latitude), longitude: Some(longitude) }
    }

    /// Both coordinates, if the fix is complete.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

/// What a collector knows about one node at the time of a snapshot.
///
/// Every evidence field is optional. Absent values mean "no evidence" and are kept
/// distinct from zero all the way through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeRecordWire")]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(rename = "lastHeard")]
    pub last_heard: Option<Timestamp>,
    pub snr: Option<f64>,
    #[serde(rename = "hopsAway")]
    pub hops_away: Option<i32>,
}

impl NodeRecord {
    pub fn new(id: impl Into<NodeId>) -> Self {
        NodeRecord {
            id: id.into(),
            display_name: None,
            position: None,
            last_heard: None,
            snr: None,
            hops_away: None,
        }
    }

    pub fn with_hops(mut self, hops: i32) -> Self {
        self.hops_away = Some(hops);
        self
    }

    pub fn with_snr(mut self, snr: f64) -> Self {
        self.snr = Some(snr);
        self
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.position = Some(Position::new(latitude, longitude));
        self
    }

    pub fn with_last_heard(mut self, last_heard: Timestamp) -> Self {
        self.last_heard = Some(last_heard);
        self
    }

    pub fn is_collection_source(&self) -> bool {
        self.hops_away == Some(COLLECTION_SOURCE_HOPS)
    }

    pub fn is_bridge(&self) -> bool {
        self.hops_away == Some(BRIDGE_HOPS)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.position.as_ref().and_then(Position::coordinates)
    }

    /// Name for log lines: the display name, or the first eight characters of the id.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self.id.as_str().chars().take(8).collect(),
        }
    }
}

#[derive(Deserialize)]
struct UserWire {
    #[serde(rename = "longName")]
    long_name: Option<String>,
}

// Collectors copy the radio's node database verbatim, so the display name may sit
// under `user.longName` and `id` may be missing (the map key is filled in later).
#[derive(Deserialize)]
struct NodeRecordWire {
    #[serde(default)]
    id: Option<NodeId>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(default)]
    user: Option<UserWire>,
    #[serde(default)]
    position: Option<Position>,
    #[serde(rename = "lastHeard", default)]
    last_heard: Option<Timestamp>,
    #[serde(default)]
    snr: Option<f64>,
    #[serde(rename = "hopsAway", default)]
    hops_away: Option<i32>,
}

impl From<NodeRecordWire> for NodeRecord {
    fn from(wire: NodeRecordWire) -> Self {
        let display_name = wire
            .display_name
            .or_else(|| wire.user.and_then(|u| u.long_name));
        NodeRecord {
            id: wire.id.unwrap_or_else(|| NodeId::new("")),
            display_name,
            position: wire.position,
            last_heard: wire.last_heard,
            snr: wire.snr,
            hops_away: wire.hops_away,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_deserialization() {
        let json = r#"{
            "id": "!collect1",
            "num": 2,
            "user": {"longName": "Collection Node", "shortName": "COL"},
            "position": {"latitude": 30.4873, "longitude": -97.8584},
            "lastHeard": 1700000000,
            "snr": 7.5,
            "hopsAway": 0
        }"#;
        let node: NodeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(node.id.as_str(), "!collect1");
        assert_eq!(node.display_name.as_deref(), Some("Collection Node"));
        assert_eq!(node.coordinates(), Some((30.4873, -97.8584)));
        assert_eq!(node.last_heard, Some(Timestamp::from_unix_secs(1_700_000_000)));
        assert!(node.is_bridge());
    }

    #[test]
    fn test_absent_evidence_stays_null() {
        let node = NodeRecord::new("!quiet");
        let value = serde_json::to_value(&node).unwrap();
        assert!(value["snr"].is_null());
        assert!(value["hopsAway"].is_null());
        assert!(value.get("position").is_none());

        let back: NodeRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_partial_position_has_no_coordinates() {
        let node: NodeRecord = serde_json::from_str(r#"{"position": {"latitude": 1.0}}"#).unwrap();
        assert_eq!(node.coordinates(), None);

        let zero = NodeRecord::new("!null-island").with_position(0.0, 0.0);
        assert_eq!(zero.coordinates(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_uuid_is_stable() {
        let a = NodeId::new("!abcd1234");
        assert_eq!(a.to_uuidv5(), NodeId::new("!abcd1234").to_uuidv5());
        assert_ne!(a.to_uuidv5(), NodeId::new("!abcd1235").to_uuidv5());
    }
}
