/*!
Evidence extraction.

Turns one snapshot into the typed evidence sets the inferencer reads:
- `HopTable`: nodes bucketed by reported hop distance, plus the collection sources.
- `RoutingIndex`: routing observations grouped by ordered `(from, to)` pair.
- `ColocatedGroup`s: nodes whose GPS fixes round to the same location key.

Everything here is built once per snapshot and only read afterwards. Missing hop
distance, position or SNR simply contributes no evidence.
*/

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use tracing::debug;

use crate::{
    network::{
        node::{BRIDGE_HOPS, COLLECTION_SOURCE_HOPS, NodeId, NodeRecord},
        routing::RoutingObservation,
    },
    topology::{config::InferenceConfig, snapshot::Snapshot},
};

/// Routing observations grouped by ordered pair. Nothing is filtered out; weighting is
/// left to the inferencer.
#[derive(Debug, Clone, Default)]
pub struct RoutingIndex {
    by_pair: HashMap<NodeId, HashMap<NodeId, Vec<RoutingObservation>>>,
}

impl RoutingIndex {
    pub fn build(observations: &[RoutingObservation]) -> Self {
        let mut by_pair: HashMap<NodeId, HashMap<NodeId, Vec<RoutingObservation>>> = HashMap::new();
        for observation in observations {
            by_pair
                .entry(observation.from.clone())
                .or_default()
                .entry(observation.to.clone())
                .or_default()
                .push(observation.clone());
        }
        RoutingIndex { by_pair }
    }

    pub fn observations(&self, from: &NodeId, to: &NodeId) -> &[RoutingObservation] {
        self.by_pair
            .get(from)
            .and_then(|targets| targets.get(to))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, from: &NodeId, to: &NodeId) -> usize {
        self.observations(from, to).len()
    }

    /// Number of distinct senders with at least one observation.
    pub fn sender_count(&self) -> usize {
        self.by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

/// GPS fix rounded to a fixed number of decimal degrees, stored as scaled integers so
/// it can be hashed and compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationKey {
    lat_scaled: i64,
    lon_scaled: i64,
    precision: u32,
}

impl LocationKey {
    pub fn from_coordinates(latitude: f64, longitude: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        LocationKey {
            lat_scaled: (latitude * scale).round() as i64,
            lon_scaled: (longitude * scale).round() as i64,
            precision,
        }
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    pub fn latitude(&self) -> f64 {
        self.lat_scaled as f64 / self.scale()
    }

    pub fn longitude(&self) -> f64 {
        self.lon_scaled as f64 / self.scale()
    }
}

impl Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = self.precision as usize;
        write!(f, "({:.p$}, {:.p$})", self.latitude(), self.longitude())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColocatedGroup {
    pub location: LocationKey,
    /// At least two members, in node id order.
    pub members: Vec<NodeId>,
}

/// Groups nodes sharing a rounded GPS location. Nodes without both coordinates are
/// never grouped, and single-member locations are discarded.
pub fn find_colocated_groups(
    nodes: &BTreeMap<NodeId, NodeRecord>,
    precision: u32,
) -> Vec<ColocatedGroup> {
    let mut groups: Vec<ColocatedGroup> = Vec::new();
    let mut index_by_key: HashMap<LocationKey, usize> = HashMap::new();

    for (id, record) in nodes {
        let Some((lat, lon)) = record.coordinates() else {
            continue;
        };
        let key = LocationKey::from_coordinates(lat, lon, precision);
        match index_by_key.get(&key) {
            Some(&index) => groups[index].members.push(id.clone()),
            None => {
                index_by_key.insert(key, groups.len());
                groups.push(ColocatedGroup { location: key, members: vec![id.clone()] });
            }
        }
    }

    groups.retain(|group| group.members.len() > 1);
    groups
}

/// Nodes bucketed by reported hop distance.
#[derive(Debug, Clone, Default)]
pub struct HopTable {
    by_hop: BTreeMap<i32, Vec<NodeId>>,
    sources: Vec<NodeId>,
    known: usize,
}

impl HopTable {
    pub fn build(nodes: &BTreeMap<NodeId, NodeRecord>) -> Self {
        let mut table = HopTable::default();
        for (id, record) in nodes {
            let Some(hops) = record.hops_away else {
                continue;
            };
            table.known += 1;
            if hops == COLLECTION_SOURCE_HOPS {
                table.sources.push(id.clone());
            } else if hops >= BRIDGE_HOPS {
                table.by_hop.entry(hops).or_default().push(id.clone());
            } else {
                debug!("Ignoring node {} with hop distance {}", id, hops);
            }
        }
        table
    }

    pub fn at(&self, hops: i32) -> &[NodeId] {
        self.by_hop.get(&hops).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bridges(&self) -> &[NodeId] {
        self.at(BRIDGE_HOPS)
    }

    /// Nodes reporting the collecting application itself (`hopsAway == -1`).
    pub fn collection_sources(&self) -> &[NodeId] {
        &self.sources
    }

    pub fn max_hop(&self) -> Option<i32> {
        self.by_hop.keys().next_back().copied()
    }

    /// Number of nodes carrying any hop distance, including collection sources.
    pub fn known_count(&self) -> usize {
        self.known
    }

    /// True when no radio node (`hopsAway >= 0`) has a hop distance.
    pub fn has_no_radio_nodes(&self) -> bool {
        self.by_hop.is_empty()
    }

    pub fn distribution(&self) -> Vec<(i32, usize)> {
        self.by_hop.iter().map(|(hop, ids)| (*hop, ids.len())).collect()
    }
}

/// The three evidence sets of one snapshot, plus read access to its node table.
#[derive(Debug, Clone)]
pub struct Evidence<'a> {
    pub nodes: &'a BTreeMap<NodeId, NodeRecord>,
    pub hops: HopTable,
    pub routing: RoutingIndex,
    pub colocated: Vec<ColocatedGroup>,
}

impl<'a> Evidence<'a> {
    pub fn extract(snapshot: &'a Snapshot, config: &InferenceConfig) -> Self {
        let hops = HopTable::build(&snapshot.nodes);
        let routing = RoutingIndex::build(&snapshot.routing_paths);
        let colocated = find_colocated_groups(&snapshot.nodes, config.colocation_precision);

        debug!(
            "Extracted evidence: hop distribution {:?}, {} routing senders, {} co-located groups",
            hops.distribution(),
            routing.sender_count(),
            colocated.len()
        );
        for group in &colocated {
            let labels: Vec<String> = group
                .members
                .iter()
                .filter_map(|id| snapshot.nodes.get(id).map(NodeRecord::label))
                .collect();
            debug!("  {}: {}", group.location, labels.join(", "));
        }

        Evidence { nodes: &snapshot.nodes, hops, routing, colocated }
    }

    pub fn node(&self, id: &NodeId) -> Option<&'a NodeRecord> {
        self.nodes.get(id)
    }

    pub fn snr(&self, id: &NodeId) -> Option<f64> {
        self.node(id).and_then(|record| record.snr)
    }

    pub fn hops_of(&self, id: &NodeId) -> Option<i32> {
        self.node(id).and_then(|record| record.hops_away)
    }
}
