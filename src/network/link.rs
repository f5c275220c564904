use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    network::{node::NodeId, time::Timestamp},
    topology::config::SignalBands,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Reported by a node itself (neighbor info)
    Confirmed,
    /// Same physical location: bridge pairing or matching GPS fix
    Colocated,
    /// Bridge node to a node one hop away
    InferredDirect,
    /// Hop N router to a node at hop N+1
    InferredHop,
}

impl LinkKind {
    /// Anything not reported by the mesh itself.
    pub fn is_soft(&self) -> bool {
        !matches!(self, LinkKind::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Confirmed => "confirmed",
            LinkKind::Colocated => "colocated",
            LinkKind::InferredDirect => "inferred_direct",
            LinkKind::InferredHop => "inferred_hop",
        }
    }
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse signal bucket used by renderers to colour links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    Good,
    Fair,
    Marginal,
    Weak,
    Poor,
    Unknown,
}

impl SignalQuality {
    pub fn classify(snr: Option<f64>, bands: &SignalBands) -> Self {
        match snr {
            None => SignalQuality::Unknown,
            Some(s) if s > bands.good => SignalQuality::Good,
            Some(s) if s > bands.fair => SignalQuality::Fair,
            Some(s) if s > bands.marginal => SignalQuality::Marginal,
            Some(s) if s > bands.weak => SignalQuality::Weak,
            Some(_) => SignalQuality::Poor,
        }
    }
}

fn default_evidence_count() -> u32 {
    1
}

fn default_evidence_kind() -> String {
    "reported".to_string()
}

/// A directed, evidence-annotated link between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default)]
    pub snr: Option<f64>,
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub confidence: Confidence,
    #[serde(rename = "evidence", default = "default_evidence_kind")]
    pub evidence_kind: String,
    #[serde(default = "default_evidence_count")]
    pub evidence_count: u32,
    #[serde(default)]
    pub hops_away: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hops_from_origin: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_snr: Option<f64>,
    #[serde(rename = "timestamp")]
    pub observed_at: Timestamp,
}

impl Link {
    pub fn key(&self) -> LinkKey {
        LinkKey::new(&self.from, &self.to)
    }

    pub fn pair_key(&self) -> UnorderedPairKey {
        UnorderedPairKey::new(&self.from, &self.to)
    }

    pub fn signal_quality(&self, bands: &SignalBands) -> SignalQuality {
        SignalQuality::classify(self.snr, bands)
    }
}

/// Direction-sensitive `from->to` key used when storing links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey(String);

impl LinkKey {
    pub fn new(from: &NodeId, to: &NodeId) -> Self {
        LinkKey(format!("{}->{}", from, to))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction-insensitive key used when pairing co-located nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnorderedPairKey {
    pub a: NodeId,
    pub b: NodeId,
}

impl UnorderedPairKey {
    pub fn new(a: &NodeId, b: &NodeId) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        UnorderedPairKey { a: a.clone(), b: b.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_is_totally_ordered() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_pair_key_ignores_direction() {
        let a = NodeId::new("!a");
        let b = NodeId::new("!b");
        assert_eq!(UnorderedPairKey::new(&a, &b), UnorderedPairKey::new(&b, &a));
        assert_ne!(LinkKey::new(&a, &b), LinkKey::new(&b, &a));
        assert_eq!(LinkKey::new(&a, &b).as_str(), "!a->!b");
    }

    #[test]
    fn test_confirmed_link_from_collector() {
        // Collectors only fill a handful of fields for neighbor-info links.
        let json = r#"{
            "from": "!a", "to": "!b", "snr": 6.25,
            "type": "confirmed", "confidence": "high",
            "timestamp": "2025-01-02T03:04:05"
        }"#;
        let link: Link = serde_json::from_str(json).unwrap();
        assert_eq!(link.kind, LinkKind::Confirmed);
        assert!(!link.kind.is_soft());
        assert_eq!(link.evidence_count, 1);
        assert_eq!(link.hops_away, 0);
        assert_eq!(link.evidence_kind, "reported");
        assert_eq!(link.router_snr, None);
    }

    #[test]
    fn test_signal_bands() {
        let bands = SignalBands::default();
        assert_eq!(SignalQuality::classify(Some(3.0), &bands), SignalQuality::Good);
        assert_eq!(SignalQuality::classify(Some(0.0), &bands), SignalQuality::Fair);
        assert_eq!(SignalQuality::classify(Some(-7.0), &bands), SignalQuality::Marginal);
        assert_eq!(SignalQuality::classify(Some(-12.0), &bands), SignalQuality::Weak);
        assert_eq!(SignalQuality::classify(Some(-20.0), &bands), SignalQuality::Poor);
        assert_eq!(SignalQuality::classify(None, &bands), SignalQuality::Unknown);
    }
}
