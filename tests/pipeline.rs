use meshnetmap::{
    Confidence, LinkKind, MergeConfig, NetworkGraph, NodeId, Snapshot, Timestamp, aggregate,
    infer_snapshot,
    topology::{
        InferencePolicy,
        packet::{MeshPacket, PacketLog},
    },
};

fn load(json: &str) -> Snapshot {
    Snapshot::from_json_str(json).unwrap()
}

fn sessions() -> Vec<(Snapshot, Option<&'static str>)> {
    vec![
        (load(include_str!("../test_data/session_a.json")), Some("session_a")),
        (load(include_str!("../test_data/session_b.json")), Some("session_b")),
    ]
}

#[test]
fn aggregates_inferred_and_reported_links() {
    let store = aggregate(sessions(), &MergeConfig::default());
    let stats = store.statistics();
    assert_eq!(stats.total_nodes, 5);
    // Bridge pairing, one direct link and one hop link from the first session.
    assert_eq!(stats.total_connections, 5);
    assert_eq!(stats.sources, 2);

    let gate = NodeId::new("!gate");
    let ridge = NodeId::new("!ridge");
    let valley = NodeId::new("!valley");
    assert_eq!(store.link(&gate, &NodeId::new("!phone")).unwrap().kind, LinkKind::Colocated);
    let direct = store.link(&gate, &ridge).unwrap();
    assert_eq!(direct.kind, LinkKind::InferredDirect);
    assert_eq!(direct.observed_at, Timestamp::parse_rfc3339("2025-06-03T10:00:00").unwrap());

    let hop = store.link(&ridge, &valley).unwrap();
    assert_eq!(hop.kind, LinkKind::InferredHop);
    assert_eq!(hop.confidence, Confidence::High);
    assert_eq!(hop.total_hops_from_origin, Some(2));

    assert_eq!(store.link(&ridge, &gate).unwrap().kind, LinkKind::Confirmed);
    assert_eq!(store.routing_paths().len(), 2);
}

#[test]
fn reported_links_only_with_inference_disabled() {
    let config = MergeConfig::default().with_policy(InferencePolicy::Never);
    let store = aggregate(sessions(), &config);
    assert_eq!(store.statistics().total_connections, 2);
    assert!(store.links().iter().all(|l| l.kind == LinkKind::Confirmed));
}

#[test]
fn export_has_documented_shape() {
    let store = aggregate(sessions(), &MergeConfig::default());
    let value = serde_json::to_value(store.export()).unwrap();

    assert_eq!(value["statistics"]["total_nodes"], 5);
    assert_eq!(value["statistics"]["sources"], 2);
    assert_eq!(value["statistics"]["signal_quality"]["good"], 4);
    assert_eq!(value["statistics"]["signal_quality"]["marginal"], 1);
    assert_eq!(value["metadata"]["sources"].as_array().unwrap().len(), 2);
    assert_eq!(value["metadata"]["sources"][1]["device"], "t-echo");
    assert!(value["nodes"]["!phone"]["snr"].is_null());
    assert!(value["connections"].as_array().unwrap().iter().all(|l| l["type"].is_string()));
}

#[test]
fn inferred_snapshot_feeds_graph() {
    let snapshot = infer_snapshot(
        load(include_str!("../test_data/colocated_snapshot.json")),
        &MergeConfig::default().inference,
    );
    let graph = NetworkGraph::build(snapshot.nodes.values(), &snapshot.connections);
    assert_eq!(graph.node_count(), 4);
    assert!(graph.link_count() > 0);
    assert!(graph.isolated_nodes().len() < 4);
}

#[test]
fn packet_log_supplies_routing_evidence() {
    let mut snapshot = load(include_str!("../test_data/session_a.json"));
    snapshot.routing_paths.clear();

    let mut log = PacketLog::new();
    let received_at = Timestamp::from_unix_secs(1_748_944_800);
    for raw in [
        r#"{"fromId": "!ridge", "toId": "!valley", "hopsAway": 1,
            "decoded": {"portnum": "POSITION_APP"}}"#,
        r#"{"fromId": "!gate", "decoded": {"portnum": "NEIGHBORINFO_APP",
            "neighbors": [{"nodeId": "!ridge", "snr": 4.0}]}}"#,
    ] {
        let packet: MeshPacket = serde_json::from_str(raw).unwrap();
        log.record(&packet, received_at);
    }
    log.apply_to(&mut snapshot);
    assert_eq!(snapshot.routing_paths.len(), 1);
    assert_eq!(snapshot.connections.len(), 1);

    let store = aggregate(vec![(snapshot, Some("packets"))], &MergeConfig::default());
    let link = store.link(&NodeId::new("!gate"), &NodeId::new("!ridge")).unwrap();
    assert_eq!(link.kind, LinkKind::Confirmed);
    assert_eq!(link.evidence_kind, "neighbor_info");
}
