use serde::{Deserialize, Serialize};

use crate::network::{node::NodeId, time::Timestamp};

fn default_packet_kind() -> String {
    "unknown".to_string()
}

/// One received packet revealing a `from -> to` relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingObservation {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub hops_away: i32,
    #[serde(rename = "packet_type", default = "default_packet_kind")]
    pub packet_kind: String,
    #[serde(rename = "timestamp", default)]
    pub observed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_snr: Option<f64>,
}

impl RoutingObservation {
    pub fn new(
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        hops_away: i32,
        packet_kind: impl Into<String>,
    ) -> Self {
        RoutingObservation {
            from: from.into(),
            to: to.into(),
            hops_away,
            packet_kind: packet_kind.into(),
            observed_at: None,
            rx_snr: None,
        }
    }
}

/// Routing path entry as written by collectors. Packets without a receiver are logged
/// too, so both endpoints are optional here.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RoutingPathWire {
    #[serde(default)]
    pub from: Option<NodeId>,
    #[serde(default)]
    pub to: Option<NodeId>,
    #[serde(default)]
    pub hops_away: Option<i32>,
    #[serde(default)]
    pub packet_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub rx_snr: Option<f64>,
}

impl RoutingPathWire {
    pub fn into_observation(self) -> Option<RoutingObservation> {
        let from = self.from.filter(|id| !id.as_str().is_empty())?;
        let to = self.to.filter(|id| !id.as_str().is_empty())?;
        Some(RoutingObservation {
            from,
            to,
            hops_away: self.hops_away.unwrap_or(0),
            packet_kind: self.packet_type.unwrap_or_else(default_packet_kind),
            observed_at: self.timestamp,
            rx_snr: self.rx_snr,
        })
    }
}
