/*!
Link inference from hop distances.

A node reported N hops from the bridge must be reachable through some node at N-1
hops. The inferencer turns that observation, plus whatever routing and GPS evidence a
snapshot carries, into a bounded set of candidate links:

1. bridge pairing: the bridge (hop 0) and the collecting application (hop -1),
2. GPS co-location: nodes sharing a rounded location key,
3. direct links: every hop-0 node to every hop-1 node,
4. chained hop links: hop N routers to hop N+1 nodes, at most a couple per node.

Steps run in that order and never re-add a pair an earlier step already produced.
*/

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    network::{
        link::{Confidence, Link, LinkKey, LinkKind, UnorderedPairKey},
        node::{BRIDGE_HOPS, NodeId},
        time::Timestamp,
    },
    topology::{config::InferenceConfig, evidence::Evidence, snapshot::Snapshot},
};

pub const EVIDENCE_BLUETOOTH: &str = "bluetooth_connection";
pub const EVIDENCE_SAME_GPS: &str = "same_gps_location";
pub const EVIDENCE_HOP_DISTANCE: &str = "hop_distance";
pub const EVIDENCE_HOP_DISTANCE_ROUTED: &str = "hop_distance_with_routing";

/// Why a router was picked for a node one hop further out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterBasis {
    /// Packets from the router to the node were observed.
    RoutingValidated,
    /// Best-heard router above the SNR floor.
    SnrHeuristic,
    /// Best-heard router, however weak.
    BestGuess,
}

impl RouterBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterBasis::RoutingValidated => "routing_validated",
            RouterBasis::SnrHeuristic => "snr_heuristic",
            RouterBasis::BestGuess => "best_guess",
        }
    }

    pub fn confidence(&self, router_snr: Option<f64>, config: &InferenceConfig) -> Confidence {
        match self {
            RouterBasis::RoutingValidated => Confidence::High,
            RouterBasis::SnrHeuristic
                if router_snr.is_some_and(|snr| snr > config.router_snr_good) =>
            {
                Confidence::Medium
            }
            _ => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone)]
struct RouterChoice<'e> {
    router: &'e NodeId,
    evidence_count: usize,
    basis: RouterBasis,
}

/// Descending SNR order; nodes without SNR sort last.
fn by_snr_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Links of one pass with both dedup keys: pairings check the unordered pair, the
/// hop-chain steps check the ordered `from->to` key.
#[derive(Debug, Default)]
struct LinkSet {
    links: Vec<Link>,
    ordered: HashSet<LinkKey>,
    pairs: HashSet<UnorderedPairKey>,
}

impl LinkSet {
    fn has_pair(&self, a: &NodeId, b: &NodeId) -> bool {
        self.pairs.contains(&UnorderedPairKey::new(a, b))
    }

    fn has_ordered(&self, from: &NodeId, to: &NodeId) -> bool {
        self.ordered.contains(&LinkKey::new(from, to))
    }

    fn push(&mut self, link: Link) {
        self.ordered.insert(link.key());
        self.pairs.insert(link.pair_key());
        self.links.push(link);
    }
}

/// Link counts per kind and per confidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    pub by_kind: BTreeMap<LinkKind, usize>,
    pub by_confidence: BTreeMap<Confidence, usize>,
}

impl LinkSummary {
    pub fn of(links: &[Link]) -> Self {
        let mut summary = LinkSummary::default();
        for link in links {
            *summary.by_kind.entry(link.kind).or_default() += 1;
            *summary.by_confidence.entry(link.confidence).or_default() += 1;
        }
        summary
    }
}

pub struct LinkInferencer<'c> {
    config: &'c InferenceConfig,
}

impl<'c> LinkInferencer<'c> {
    pub fn new(config: &'c InferenceConfig) -> Self {
        Self { config }
    }

    /// Runs all four steps over the evidence. Every link is stamped with `observed_at`,
    /// so the same evidence always yields the same links.
    pub fn infer(&self, evidence: &Evidence<'_>, observed_at: Timestamp) -> Vec<Link> {
        if evidence.hops.has_no_radio_nodes() || evidence.hops.known_count() < 2 {
            warn!(
                "Not enough hop distance evidence to infer links ({} nodes with a hop distance)",
                evidence.hops.known_count()
            );
            return Vec::new();
        }

        let mut set = LinkSet::default();
        self.pair_bridges(evidence, observed_at, &mut set);
        self.pair_colocated(evidence, observed_at, &mut set);
        self.link_direct(evidence, observed_at, &mut set);
        self.link_hop_chain(evidence, observed_at, &mut set);

        let summary = LinkSummary::of(&set.links);
        info!(
            "Inferred {} links; by type {:?}, by confidence {:?}",
            set.links.len(),
            summary.by_kind,
            summary.by_confidence
        );
        set.links
    }

    fn pair_bridges(&self, evidence: &Evidence<'_>, observed_at: Timestamp, set: &mut LinkSet) {
        for source in evidence.hops.collection_sources() {
            for bridge in evidence.hops.bridges() {
                if set.has_pair(source, bridge) {
                    continue;
                }
                debug!("Collection pair {} <-> {}", source, bridge);
                set.push(Link {
                    from: bridge.clone(),
                    to: source.clone(),
                    snr: Some(evidence.snr(bridge).unwrap_or(self.config.colocated_default_snr)),
                    kind: LinkKind::Colocated,
                    confidence: Confidence::High,
                    evidence_kind: EVIDENCE_BLUETOOTH.to_string(),
                    evidence_count: 1,
                    hops_away: 0,
                    total_hops_from_origin: None,
                    router_snr: None,
                    observed_at,
                });
            }
        }
    }

    fn pair_colocated(&self, evidence: &Evidence<'_>, observed_at: Timestamp, set: &mut LinkSet) {
        for group in &evidence.colocated {
            for (i, first) in group.members.iter().enumerate() {
                for second in &group.members[i + 1..] {
                    if set.has_pair(first, second) {
                        continue;
                    }
                    let snr = evidence
                        .snr(first)
                        .or_else(|| evidence.snr(second))
                        .unwrap_or(self.config.colocated_default_snr);

                    // The bridge end, when there is exactly one, is the origin.
                    let second_is_bridge = evidence.hops_of(second) == Some(BRIDGE_HOPS);
                    let first_is_bridge = evidence.hops_of(first) == Some(BRIDGE_HOPS);
                    let (from, to) = if second_is_bridge && !first_is_bridge {
                        (second, first)
                    } else {
                        (first, second)
                    };

                    debug!("Co-located {} <-> {} at {}", from, to, group.location);
                    set.push(Link {
                        from: from.clone(),
                        to: to.clone(),
                        snr: Some(snr),
                        kind: LinkKind::Colocated,
                        confidence: Confidence::High,
                        evidence_kind: EVIDENCE_SAME_GPS.to_string(),
                        evidence_count: 1,
                        hops_away: 0,
                        total_hops_from_origin: None,
                        router_snr: None,
                        observed_at,
                    });
                }
            }
        }
    }

    fn link_direct(&self, evidence: &Evidence<'_>, observed_at: Timestamp, set: &mut LinkSet) {
        for bridge in evidence.hops.at(0) {
            for neighbor in evidence.hops.at(1) {
                if set.has_ordered(bridge, neighbor) {
                    continue;
                }
                let count = evidence.routing.count(bridge, neighbor);
                let (confidence, evidence_kind) = if count > 0 {
                    (Confidence::High, EVIDENCE_HOP_DISTANCE_ROUTED)
                } else {
                    (Confidence::Medium, EVIDENCE_HOP_DISTANCE)
                };
                set.push(Link {
                    from: bridge.clone(),
                    to: neighbor.clone(),
                    snr: evidence.snr(neighbor),
                    kind: LinkKind::InferredDirect,
                    confidence,
                    evidence_kind: evidence_kind.to_string(),
                    evidence_count: count as u32,
                    hops_away: 1,
                    total_hops_from_origin: None,
                    router_snr: None,
                    observed_at,
                });
            }
        }
    }

    fn link_hop_chain(&self, evidence: &Evidence<'_>, observed_at: Timestamp, set: &mut LinkSet) {
        let Some(max_hop) = evidence.hops.max_hop() else {
            return;
        };
        for hop in 1..max_hop {
            let routers = evidence.hops.at(hop);
            let targets = evidence.hops.at(hop + 1);
            if routers.is_empty() || targets.is_empty() {
                continue;
            }
            debug!("Inferring links hop {} -> {} ({} nodes)", hop, hop + 1, targets.len());

            for target in targets {
                for choice in self.choose_routers(evidence, routers, target) {
                    if set.has_ordered(choice.router, target) {
                        continue;
                    }
                    let router_snr = evidence.snr(choice.router);
                    set.push(Link {
                        from: choice.router.clone(),
                        to: target.clone(),
                        snr: evidence.snr(target),
                        kind: LinkKind::InferredHop,
                        confidence: choice.basis.confidence(router_snr, self.config),
                        evidence_kind: choice.basis.as_str().to_string(),
                        evidence_count: choice.evidence_count as u32,
                        hops_away: 1,
                        total_hops_from_origin: Some(hop + 1),
                        router_snr,
                        observed_at,
                    });
                }
            }
        }
    }

    /// Routers for `target`: up to `max_validated_routers` with routing evidence,
    /// ranked by observation count, otherwise the single best-heard router. Ties keep
    /// node id order.
    fn choose_routers<'e>(
        &self,
        evidence: &Evidence<'_>,
        routers: &'e [NodeId],
        target: &NodeId,
    ) -> Vec<RouterChoice<'e>> {
        let mut ranked: Vec<&'e NodeId> = routers.iter().collect();
        ranked.sort_by(|a, b| by_snr_desc(evidence.snr(a), evidence.snr(b)));

        let mut validated: Vec<RouterChoice<'e>> = ranked
            .iter()
            .filter_map(|router| {
                let count = evidence.routing.count(router, target);
                (count > 0).then_some(RouterChoice {
                    router: *router,
                    evidence_count: count,
                    basis: RouterBasis::RoutingValidated,
                })
            })
            .collect();
        if !validated.is_empty() {
            validated.sort_by(|a, b| b.evidence_count.cmp(&a.evidence_count));
            validated.truncate(self.config.max_validated_routers);
            return validated;
        }

        let floor = self.config.router_snr_floor;
        let heuristic = ranked
            .iter()
            .find(|router| evidence.snr(router).is_some_and(|snr| snr > floor))
            .map(|router| RouterChoice {
                router: *router,
                evidence_count: 0,
                basis: RouterBasis::SnrHeuristic,
            });

        heuristic
            .or_else(|| {
                ranked.first().map(|router| RouterChoice {
                    router: *router,
                    evidence_count: 0,
                    basis: RouterBasis::BestGuess,
                })
            })
            .into_iter()
            .collect()
    }
}

/// Infers the link set of one snapshot.
pub fn infer_links(
    snapshot: &Snapshot,
    config: &InferenceConfig,
    observed_at: Timestamp,
) -> Vec<Link> {
    let evidence = Evidence::extract(snapshot, config);
    LinkInferencer::new(config).infer(&evidence, observed_at)
}
