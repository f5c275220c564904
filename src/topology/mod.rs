/*!
Topology module

This module turns collection snapshots into an inferred, aggregated mesh topology.

Structure:
- `config`: Tunable thresholds (`InferenceConfig`, `SignalBands`) and the `MergeConfig`
            that bundles them with the inference policy.
- `snapshot`: The validated input boundary (`Snapshot`, `SnapshotError`).
- `evidence`: Hop table, routing index and co-located groups extracted from a snapshot.
- `inference`: The `LinkInferencer` that derives links from evidence.
- `packet`: Routing observations and neighbor-info links taken from raw mesh packets.
- `store`: `TopologyStore`, which merges snapshots from many sources.
- `pipeline`: Single-snapshot inference and multi-snapshot aggregation.

Re-exports:
- The config, snapshot and store types plus the pipeline entry points, for callers that
  only need the top-level flow.
*/

pub mod config;
pub mod evidence;
pub mod inference;
pub mod packet;
pub mod pipeline;
pub mod snapshot;
pub mod store;

pub use config::{ConfigError, InferenceConfig, InferencePolicy, MergeConfig, SignalBands};
pub use inference::{LinkInferencer, LinkSummary, infer_links};
pub use pipeline::{aggregate, infer_snapshot, prepare_snapshot};
pub use snapshot::{Snapshot, SnapshotError, SnapshotMetadata};
pub use store::{AggregatedTopology, LinkMerge, TopologyStatistics, TopologyStore};
