/*!
Packet-level evidence.

The collection layer hands over decoded mesh packets whose shape varies with firmware
and packet type. `MeshPacket` models the fields this crate reads, all optional, and
`PacketLog` turns a stream of them into routing observations and confirmed neighbor
links for a snapshot.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    network::{
        link::{Confidence, Link, LinkKind},
        node::NodeId,
        routing::RoutingObservation,
        time::Timestamp,
    },
    topology::snapshot::Snapshot,
};

pub const NEIGHBOR_INFO_PORT: &str = "NEIGHBORINFO_APP";
pub const EVIDENCE_NEIGHBOR_INFO: &str = "neighbor_info";

/// Node address as it appears in packets: a `!hex` id string or the raw node number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacketAddress {
    Id(String),
    Num(u64),
}

impl PacketAddress {
    pub fn to_node_id(&self) -> Option<NodeId> {
        match self {
            PacketAddress::Id(id) if id.is_empty() => None,
            PacketAddress::Id(id) => Some(NodeId::new(id.as_str())),
            PacketAddress::Num(num) => Some(NodeId::new(format!("!{:08x}", num))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    #[serde(rename = "nodeId", default)]
    pub node_id_camel: Option<PacketAddress>,
    #[serde(default)]
    pub node_id: Option<PacketAddress>,
    #[serde(default)]
    pub id: Option<PacketAddress>,
    #[serde(default)]
    pub snr: Option<f64>,
    #[serde(default)]
    pub last_rx_snr: Option<f64>,
}

impl NeighborEntry {
    pub fn neighbor(&self) -> Option<NodeId> {
        [&self.node_id_camel, &self.node_id, &self.id]
            .into_iter()
            .flatten()
            .find_map(PacketAddress::to_node_id)
    }

    pub fn snr(&self) -> Option<f64> {
        self.snr.or(self.last_rx_snr)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborInfo {
    #[serde(default)]
    pub neighbors: Option<Vec<NeighborEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedPayload {
    #[serde(default)]
    pub portnum: Option<String>,
    #[serde(default)]
    pub neighborinfo: Option<NeighborInfo>,
    #[serde(default)]
    pub neighbors: Option<Vec<NeighborEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPacket {
    #[serde(rename = "fromId", default)]
    pub from_id: Option<String>,
    #[serde(default)]
    pub from: Option<PacketAddress>,
    #[serde(rename = "toId", default)]
    pub to_id: Option<String>,
    #[serde(default)]
    pub to: Option<PacketAddress>,
    #[serde(rename = "hopsAway", default)]
    pub hops_away: Option<i32>,
    #[serde(rename = "hopStart", default)]
    pub hop_start: Option<i32>,
    #[serde(rename = "hopLimit", default)]
    pub hop_limit: Option<i32>,
    #[serde(rename = "rxSnr", default)]
    pub rx_snr: Option<f64>,
    #[serde(default)]
    pub decoded: Option<DecodedPayload>,
    #[serde(default)]
    pub neighbors: Option<Vec<NeighborEntry>>,
}

impl MeshPacket {
    pub fn sender(&self) -> Option<NodeId> {
        match &self.from_id {
            Some(id) if !id.is_empty() => Some(NodeId::new(id.as_str())),
            _ => self.from.as_ref().and_then(PacketAddress::to_node_id),
        }
    }

    pub fn receiver(&self) -> Option<NodeId> {
        match &self.to_id {
            Some(id) if !id.is_empty() => Some(NodeId::new(id.as_str())),
            _ => self.to.as_ref().and_then(PacketAddress::to_node_id),
        }
    }

    pub fn port(&self) -> Option<&str> {
        self.decoded.as_ref().and_then(|d| d.portnum.as_deref())
    }

    /// Reported hop count, else what the hop budget says was spent, else zero.
    pub fn hops_travelled(&self) -> i32 {
        match (self.hops_away, self.hop_start, self.hop_limit) {
            (Some(hops), _, _) => hops,
            (None, Some(start), Some(limit)) if start >= limit => start - limit,
            _ => 0,
        }
    }

    /// Neighbor list from wherever this firmware put it.
    pub fn neighbor_entries(&self) -> Option<&[NeighborEntry]> {
        let decoded = self.decoded.as_ref();
        decoded
            .and_then(|d| d.neighborinfo.as_ref())
            .and_then(|info| info.neighbors.as_deref())
            .or_else(|| decoded.and_then(|d| d.neighbors.as_deref()))
            .or(self.neighbors.as_deref())
    }
}

/// A routing observation for packets with both endpoints and a non-negative hop count.
pub fn observation_from_packet(
    packet: &MeshPacket,
    received_at: Timestamp,
) -> Option<RoutingObservation> {
    let from = packet.sender()?;
    let to = packet.receiver()?;
    let hops = packet.hops_travelled();
    if hops < 0 {
        return None;
    }
    Some(RoutingObservation {
        from,
        to,
        hops_away: hops,
        packet_kind: packet.port().unwrap_or("unknown").to_string(),
        observed_at: Some(received_at),
        rx_snr: packet.rx_snr,
    })
}

/// Confirmed links reported by a neighbor-info packet. Empty for any other packet.
pub fn confirmed_links_from_packet(packet: &MeshPacket, observed_at: Timestamp) -> Vec<Link> {
    if packet.port() != Some(NEIGHBOR_INFO_PORT) {
        return Vec::new();
    }
    let Some(sender) = packet.sender() else {
        return Vec::new();
    };
    let Some(entries) = packet.neighbor_entries().filter(|e| !e.is_empty()) else {
        warn!("NeighborInfo packet from {} has no neighbors list", sender);
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let neighbor = entry.neighbor()?;
            Some(Link {
                from: sender.clone(),
                to: neighbor,
                snr: entry.snr(),
                kind: LinkKind::Confirmed,
                confidence: Confidence::High,
                evidence_kind: EVIDENCE_NEIGHBOR_INFO.to_string(),
                evidence_count: 1,
                hops_away: 0,
                total_hops_from_origin: None,
                router_snr: None,
                observed_at,
            })
        })
        .collect()
}

/// Evidence accumulated from the packets of one collection session.
#[derive(Debug, Clone, Default)]
pub struct PacketLog {
    observations: Vec<RoutingObservation>,
    confirmed: Vec<Link>,
    packet_counts: BTreeMap<String, usize>,
    received: usize,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, packet: &MeshPacket, received_at: Timestamp) {
        self.received += 1;
        let port = packet.port().unwrap_or("unknown");
        *self.packet_counts.entry(port.to_string()).or_default() += 1;

        if let Some(observation) = observation_from_packet(packet, received_at) {
            self.observations.push(observation);
        } else {
            debug!("Packet {} carried no routing evidence", port);
        }

        let links = confirmed_links_from_packet(packet, received_at);
        if !links.is_empty() {
            info!("Found {} neighbors for {}", links.len(), links[0].from);
            self.confirmed.extend(links);
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn packet_counts(&self) -> &BTreeMap<String, usize> {
        &self.packet_counts
    }

    pub fn observations(&self) -> &[RoutingObservation] {
        &self.observations
    }

    pub fn confirmed_links(&self) -> &[Link] {
        &self.confirmed
    }

    /// Appends the log's observations and confirmed links to a snapshot. Links to nodes
    /// the snapshot does not know are dropped.
    pub fn apply_to(self, snapshot: &mut Snapshot) {
        snapshot.routing_paths.extend(self.observations);
        let mut links = std::mem::take(&mut snapshot.connections);
        links.extend(self.confirmed);
        snapshot.set_connections(links);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::node::NodeRecord;

    fn packet(json: &str) -> MeshPacket {
        serde_json::from_str(json).unwrap()
    }

    fn at() -> Timestamp {
        Timestamp::from_unix_secs(1_750_000_000)
    }

    #[test]
    fn test_observation_from_packet() {
        let p = packet(
            r#"{"fromId": "!aa", "toId": "!bb", "hopsAway": 2, "rxSnr": -4.5,
                "decoded": {"portnum": "POSITION_APP"}}"#,
        );
        let obs = observation_from_packet(&p, at()).unwrap();
        assert_eq!(obs.from.as_str(), "!aa");
        assert_eq!(obs.to.as_str(), "!bb");
        assert_eq!(obs.hops_away, 2);
        assert_eq!(obs.packet_kind, "POSITION_APP");
        assert_eq!(obs.rx_snr, Some(-4.5));
    }

    #[test]
    fn test_numeric_addresses_and_hop_budget() {
        let p = packet(r#"{"from": 2864434397, "to": 4294967295, "hopStart": 3, "hopLimit": 1}"#);
        let obs = observation_from_packet(&p, at()).unwrap();
        assert_eq!(obs.from.as_str(), "!aabbccdd");
        assert_eq!(obs.to.as_str(), "!ffffffff");
        assert_eq!(obs.hops_away, 2);
        assert_eq!(obs.packet_kind, "unknown");

        assert!(observation_from_packet(&packet(r#"{"fromId": "!aa"}"#), at()).is_none());
        let backwards = packet(r#"{"fromId": "!aa", "toId": "!bb", "hopsAway": -1}"#);
        assert!(observation_from_packet(&backwards, at()).is_none());
    }

    #[test]
    fn test_neighbor_info_locations() {
        let nested = packet(r#"{"fromId": "!aa", "decoded": {"portnum": "NEIGHBORINFO_APP",
            "neighborinfo": {"neighbors": [
                {"nodeId": "!bb", "snr": 6.0},
                {"node_id": "!cc", "last_rx_snr": -2.0}
            ]}}}"#);
        let links = confirmed_links_from_packet(&nested, at());
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].to.as_str(), "!bb");
        assert_eq!(links[1].snr, Some(-2.0));
        assert!(
            links
                .iter()
                .all(|l| l.kind == LinkKind::Confirmed && l.confidence == Confidence::High)
        );

        let flat = packet(
            r#"{"fromId": "!aa", "decoded": {"portnum": "NEIGHBORINFO_APP"},
                "neighbors": [{"id": "!dd"}]}"#,
        );
        let links = confirmed_links_from_packet(&flat, at());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].snr, None);

        let empty = packet(
            r#"{"fromId": "!aa", "decoded": {"portnum": "NEIGHBORINFO_APP", "neighbors": []}}"#,
        );
        assert!(confirmed_links_from_packet(&empty, at()).is_empty());

        let other = packet(
            r#"{"fromId": "!aa", "decoded": {"portnum": "TEXT_MESSAGE_APP"},
                "neighbors": [{"id": "!dd"}]}"#,
        );
        assert!(confirmed_links_from_packet(&other, at()).is_empty());
    }

    #[test]
    fn test_packet_log_feeds_snapshot() {
        let mut log = PacketLog::new();
        let text = packet(
            r#"{"fromId": "!aa", "toId": "!bb", "decoded": {"portnum": "TEXT_MESSAGE_APP"}}"#,
        );
        let neighbors = packet(
            r#"{"fromId": "!aa", "toId": "^all", "decoded": {"portnum": "NEIGHBORINFO_APP",
                "neighbors": [{"nodeId": "!bb", "snr": 3.0}, {"nodeId": "!zz", "snr": 1.0}]}}"#,
        );
        log.record(&text, at());
        log.record(&neighbors, at());
        assert_eq!(log.received(), 2);
        assert_eq!(log.packet_counts()[NEIGHBOR_INFO_PORT], 1);
        assert_eq!(log.observations().len(), 2);
        assert_eq!(log.confirmed_links().len(), 2);

        let mut snapshot = Snapshot::new()
            .with_node(NodeRecord::new("!aa").with_hops(0))
            .with_node(NodeRecord::new("!bb").with_hops(1));
        log.apply_to(&mut snapshot);
        assert_eq!(snapshot.routing_paths.len(), 2);
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(snapshot.connections[0].to.as_str(), "!bb");
    }
}
