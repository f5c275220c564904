pub mod network;
pub mod topology;

pub use network::{
    link::{Confidence, Link, LinkKind, SignalQuality},
    network_graph::NetworkGraph,
    node::{NodeId, NodeRecord},
    routing::RoutingObservation,
    time::Timestamp,
};
pub use topology::{MergeConfig, Snapshot, SnapshotError, TopologyStore, aggregate, infer_snapshot};
