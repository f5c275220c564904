/*!
This module provides the running aggregate that snapshots from independent collection
sessions are folded into.

This module defines:
- `TopologyStore`: the aggregate itself, with the node, link and routing merge rules.
- `LinkMerge`: what happened to one incoming link.
- `SourceRecord`: one contributing collection session.
- `TopologyStatistics` / `AggregatedTopology`: the exported view.

Merging is order sensitive. "Newer" is judged against whatever has already been folded
in, so the same snapshots folded in a different order can pick different winners on
ties. Callers that collect concurrently must funnel snapshots through a single owner.

Two links of the same soft kind under one key follow the same-kind rule (newer wins),
not the accumulate rule. Only soft links of different kinds add up `evidence_count`, so
a pair seen co-located in two sessions keeps the count of the winning observation.
*/

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    network::{
        link::{Link, LinkKey, SignalQuality},
        node::{NodeId, NodeRecord},
        routing::RoutingObservation,
        time::Timestamp,
    },
    topology::{config::SignalBands, snapshot::Snapshot},
};

/// One collection session that contributed to the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: String,
    #[serde(rename = "timestamp")]
    pub collected_at: Option<Timestamp>,
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyStatistics {
    pub total_nodes: usize,
    pub total_connections: usize,
    pub sources: usize,
    /// Links per signal band, for renderers that colour or filter by link quality.
    pub signal_quality: BTreeMap<SignalQuality, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetadata {
    pub sources: Vec<SourceRecord>,
}

/// The aggregate as handed to renderers and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTopology {
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    pub connections: Vec<Link>,
    pub routing_paths: Vec<RoutingObservation>,
    pub statistics: TopologyStatistics,
    pub metadata: AggregationMetadata,
}

/// Outcome of merging one link into the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMerge {
    Inserted,
    Replaced,
    /// Evidence count added to the stored link; its other fields were left alone.
    Accumulated,
    Kept,
    /// An endpoint is not a known node.
    Dropped,
}

fn is_newer(incoming: Option<Timestamp>, existing: Option<Timestamp>) -> bool {
    match (incoming, existing) {
        (Some(incoming), Some(existing)) => incoming > existing,
        (Some(_), None) => true,
        _ => false,
    }
}

fn has_better_snr(incoming: Option<f64>, existing: Option<f64>) -> bool {
    match (incoming, existing) {
        (Some(incoming), Some(existing)) => incoming > existing,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Storage for the aggregate topology. Manages merging snapshots into it.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    nodes: BTreeMap<NodeId, NodeRecord>,
    links: Vec<Link>,
    link_index: HashMap<LinkKey, usize>,
    routing_paths: Vec<RoutingObservation>,
    sources: Vec<SourceRecord>,
    signal_bands: SignalBands,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Band edges used to classify links in `statistics` and `export`.
    pub fn with_signal_bands(mut self, signal_bands: SignalBands) -> Self {
        self.signal_bands = signal_bands;
        self
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, NodeRecord> {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, from: &NodeId, to: &NodeId) -> Option<&Link> {
        self.link_index.get(&LinkKey::new(from, to)).map(|&i| &self.links[i])
    }

    pub fn routing_paths(&self) -> &[RoutingObservation] {
        &self.routing_paths
    }

    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    /// Folds one snapshot into the aggregate: nodes first, so links can resolve their
    /// endpoints, then links, then routing observations.
    pub fn merge_snapshot(&mut self, snapshot: Snapshot, source: Option<&str>) {
        let Snapshot { nodes, connections, routing_paths, metadata } = snapshot;

        let node_count = nodes.len();
        for record in nodes.into_values() {
            self.merge_node(record);
        }

        let link_count = connections.len();
        for link in connections {
            self.merge_link(link);
        }

        let observation_count = routing_paths.len();
        self.routing_paths.extend(routing_paths);

        if let Some(source) = source {
            self.sources.push(SourceRecord {
                source: source.to_string(),
                collected_at: metadata.collection_time,
                device: metadata.collection_device,
            });
        }

        info!(
            "Added topology data from {}: {} nodes, {} links, {} routing observations",
            source.unwrap_or("unknown source"),
            node_count,
            link_count,
            observation_count
        );
    }

    /// Inserts a new node, or replaces the stored record wholesale when the incoming
    /// one was heard strictly later. Returns whether the store changed.
    pub fn merge_node(&mut self, record: NodeRecord) -> bool {
        match self.nodes.get_mut(&record.id) {
            None => {
                self.nodes.insert(record.id.clone(), record);
                true
            }
            Some(existing) if is_newer(record.last_heard, existing.last_heard) => {
                debug!("Node {} updated from a newer record", record.id);
                *existing = record;
                true
            }
            Some(_) => false,
        }
    }

    /// Applies the link precedence rules for the link's `from->to` key.
    pub fn merge_link(&mut self, link: Link) -> LinkMerge {
        let key = link.key();
        let Some(&index) = self.link_index.get(&key) else {
            if !self.nodes.contains_key(&link.from) || !self.nodes.contains_key(&link.to) {
                debug!("Dropping dangling link {}", key);
                return LinkMerge::Dropped;
            }
            self.link_index.insert(key, self.links.len());
            self.links.push(link);
            return LinkMerge::Inserted;
        };

        let existing = &mut self.links[index];
        let outcome = if !link.kind.is_soft() && existing.kind.is_soft() {
            *existing = link;
            LinkMerge::Replaced
        } else if link.kind == existing.kind {
            let newer = link.observed_at > existing.observed_at;
            let tie_but_stronger =
                link.observed_at == existing.observed_at && has_better_snr(link.snr, existing.snr);
            if newer || tie_but_stronger {
                *existing = link;
                LinkMerge::Replaced
            } else {
                LinkMerge::Kept
            }
        } else if link.kind.is_soft() && existing.kind.is_soft() {
            existing.evidence_count = existing.evidence_count.saturating_add(link.evidence_count);
            LinkMerge::Accumulated
        } else {
            LinkMerge::Kept
        };
        debug!("Link {}: {:?}", key, outcome);
        outcome
    }

    /// Computed from the current contents on every call.
    pub fn statistics(&self) -> TopologyStatistics {
        let distinct: HashSet<&str> = self.sources.iter().map(|s| s.source.as_str()).collect();
        let mut signal_quality = BTreeMap::new();
        for link in &self.links {
            *signal_quality.entry(link.signal_quality(&self.signal_bands)).or_default() += 1;
        }
        TopologyStatistics {
            total_nodes: self.nodes.len(),
            total_connections: self.links.len(),
            sources: distinct.len(),
            signal_quality,
        }
    }

    pub fn export(&self) -> AggregatedTopology {
        let statistics = self.statistics();
        info!("Statistics: {:?}", statistics);
        AggregatedTopology {
            nodes: self.nodes.clone(),
            connections: self.links.clone(),
            routing_paths: self.routing_paths.clone(),
            statistics,
            metadata: AggregationMetadata { sources: self.sources.clone() },
        }
    }
}
