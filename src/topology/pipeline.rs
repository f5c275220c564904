/*!
Single-snapshot inference and multi-snapshot aggregation.

Both entry points are pure: they take owned snapshots and return new values. Links
inferred from a snapshot are stamped with `Snapshot::reference_time`, so running the
same input twice produces the same output.
*/

use tracing::{debug, info};

use crate::topology::{
    config::{InferenceConfig, InferencePolicy, MergeConfig},
    inference::infer_links,
    snapshot::Snapshot,
    store::TopologyStore,
};

/// Returns the snapshot with its connections replaced by the inferred link set.
pub fn infer_snapshot(mut snapshot: Snapshot, config: &InferenceConfig) -> Snapshot {
    let observed_at = snapshot.reference_time();
    let links = infer_links(&snapshot, config, observed_at);
    debug!("Replacing {} reported links with {} inferred", snapshot.connections.len(), links.len());
    snapshot.set_connections(links);
    snapshot
}

/// Applies the inference policy to one snapshot ahead of merging.
pub fn prepare_snapshot(snapshot: Snapshot, config: &MergeConfig) -> Snapshot {
    match config.policy {
        InferencePolicy::Always => infer_snapshot(snapshot, &config.inference),
        InferencePolicy::WhenUnconfirmed if snapshot.connections.is_empty() => {
            infer_snapshot(snapshot, &config.inference)
        }
        InferencePolicy::WhenUnconfirmed | InferencePolicy::Never => {
            debug!("Keeping {} reported links", snapshot.connections.len());
            snapshot
        }
    }
}

/// Folds snapshots into a fresh store in the order given. Each item pairs a snapshot
/// with the name of the source it came from, if known.
pub fn aggregate<I, S>(snapshots: I, config: &MergeConfig) -> TopologyStore
where
    I: IntoIterator<Item = (Snapshot, Option<S>)>,
    S: AsRef<str>,
{
    let mut store = TopologyStore::new().with_signal_bands(config.signal_bands.clone());
    for (snapshot, source) in snapshots {
        let prepared = prepare_snapshot(snapshot, config);
        let source = source.as_ref().map(|s| AsRef::<str>::as_ref(s));
        store.merge_snapshot(prepared, source);
    }
    let stats = store.statistics();
    info!(
        "Aggregated {} nodes and {} links from {} sources",
        stats.total_nodes, stats.total_connections, stats.sources
    );
    store
}
