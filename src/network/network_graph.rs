use std::collections::{HashMap, HashSet};

use petgraph::{
    Directed, Direction,
    graph::NodeIndex,
    prelude::StableGraph,
    unionfind::UnionFind,
    visit::{EdgeRef, NodeIndexable},
};
use tracing::debug;
use uuid::Uuid;

use crate::network::{
    link::Link,
    node::{NodeId, NodeRecord},
};

/// A directed graph view of a topology, for renderers and structural queries.
///
/// One vertex per node record and one edge per link. `node_id_to_index_map` resolves
/// mesh ids to vertices; `uuid_to_index_map` does the same for consumers keyed by UUID.
pub struct NetworkGraph {
    pub graph: StableGraph<NodeRecord, Link, Directed>,
    pub node_id_to_index_map: HashMap<NodeId, NodeIndex>,
    pub uuid_to_index_map: HashMap<Uuid, NodeIndex>,
}

impl NetworkGraph {
    /// Build a graph from node records and links. Links naming an unknown node are
    /// skipped rather than creating placeholder vertices.
    pub fn build<'a, N, L>(nodes: N, links: L) -> Self
    where
        N: IntoIterator<Item = &'a NodeRecord>,
        L: IntoIterator<Item = &'a Link>,
    {
        let mut graph = StableGraph::new();
        let mut node_id_to_index_map = HashMap::new();
        let mut uuid_to_index_map = HashMap::new();
        for record in nodes {
            let id = record.id.clone();
            let uuid = id.to_uuidv5();
            let index = graph.add_node(record.clone());
            node_id_to_index_map.insert(id, index);
            uuid_to_index_map.insert(uuid, index);
        }

        let mut skipped = 0usize;
        for link in links {
            match (node_id_to_index_map.get(&link.from), node_id_to_index_map.get(&link.to)) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, link.clone());
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("Skipped {} links with unknown endpoints", skipped);
        }

        Self {
            graph,
            node_id_to_index_map,
            uuid_to_index_map,
        }
    }

    pub fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_id_to_index_map.get(id).copied()
    }

    pub fn node_by_uuid(&self, uuid: &Uuid) -> Option<&NodeRecord> {
        self.uuid_to_index_map.get(uuid).and_then(|&index| self.graph.node_weight(index))
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.node_index(id).and_then(|index| self.graph.node_weight(index))
    }

    /// Targets of the node's outgoing links, deduplicated, in id order.
    pub fn neighbors(&self, id: &NodeId) -> Vec<&NodeId> {
        let Some(index) = self.node_index(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut targets: Vec<&NodeId> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .filter_map(|edge| self.graph.node_weight(edge.target()))
            .map(|record| &record.id)
            .filter(|id| seen.insert(*id))
            .collect();
        targets.sort();
        targets
    }

    /// Nodes with no incident link in either direction, in id order.
    pub fn isolated_nodes(&self) -> Vec<&NodeId> {
        let mut isolated: Vec<&NodeId> = self
            .graph
            .node_indices()
            .filter(|&index| self.graph.neighbors_undirected(index).next().is_none())
            .filter_map(|index| self.graph.node_weight(index))
            .map(|record| &record.id)
            .collect();
        isolated.sort();
        isolated
    }

    /// Number of weakly connected components; link direction is ignored.
    pub fn component_count(&self) -> usize {
        let mut components = UnionFind::<usize>::new(self.graph.node_bound());
        for edge in self.graph.edge_indices() {
            if let Some((source, target)) = self.graph.edge_endpoints(edge) {
                components.union(source.index(), target.index());
            }
        }
        self.graph
            .node_indices()
            .map(|index| components.find(index.index()))
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{config::InferenceConfig, pipeline::infer_snapshot, snapshot::Snapshot};

    #[test]
    fn test_graph_from_inferred_snapshot() {
        let json = include_str!("../../test_data/multi_hop_snapshot.json");
        let snapshot =
            infer_snapshot(Snapshot::from_json_str(json).unwrap(), &InferenceConfig::default());
        let graph = NetworkGraph::build(snapshot.nodes.values(), &snapshot.connections);

        assert_eq!(graph.node_count(), snapshot.nodes.len());
        assert_eq!(graph.link_count(), snapshot.connections.len());

        let base = NodeId::new("!base0000");
        assert_eq!(graph.node(&base).map(|n| n.id.clone()), Some(base.clone()));
        let targets: Vec<&str> = graph.neighbors(&base).into_iter().map(NodeId::as_str).collect();
        assert_eq!(targets, vec!["!hop1aaaa", "!hop1bbbb"]);
        assert!(graph.node_by_uuid(&base.to_uuidv5()).is_some());
    }

    #[test]
    fn test_isolated_nodes_and_components() {
        let records = vec![
            NodeRecord::new("!a").with_hops(0),
            NodeRecord::new("!b").with_hops(1),
            NodeRecord::new("!c").with_hops(2),
            NodeRecord::new("!d"),
        ];
        let links: Vec<Link> = serde_json::from_str(
            r#"[
                {"from": "!b", "to": "!a", "type": "confirmed", "confidence": "high",
                 "timestamp": 1700000000},
                {"from": "!c", "to": "!ghost", "type": "confirmed", "confidence": "high",
                 "timestamp": 1700000000}
            ]"#,
        )
        .unwrap();
        let graph = NetworkGraph::build(&records, &links);

        assert_eq!(graph.link_count(), 1);
        let isolated: Vec<&str> = graph.isolated_nodes().into_iter().map(NodeId::as_str).collect();
        assert_eq!(isolated, vec!["!c", "!d"]);
        assert_eq!(graph.component_count(), 3);
        assert!(graph.neighbors(&NodeId::new("!a")).is_empty());
        assert!(graph.neighbors(&NodeId::new("!nope")).is_empty());
    }
}
