/*!
Tunable constants of the inference and merge stages.

This module defines:
- `InferenceConfig`: co-location precision, router SNR thresholds and the router cutoff.
- `SignalBands`: SNR band edges used to classify link quality.
- `InferencePolicy`: when a snapshot's links are inferred before merging.
- `MergeConfig`: everything the pipeline needs, loadable from partial JSON.

All values default to the constants the heuristics were tuned with.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Decimal places kept when rounding GPS fixes into location keys (4 is about 11 m).
    pub colocation_precision: u32,
    /// A fallback router must be heard above this SNR to count as a heuristic choice.
    pub router_snr_floor: f64,
    /// A heuristic router above this SNR earns medium confidence instead of low.
    pub router_snr_good: f64,
    /// SNR assumed for co-located pairs that report none.
    pub colocated_default_snr: f64,
    /// Upper bound of routing-validated routers linked to a single node.
    pub max_validated_routers: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            colocation_precision: 4,
            router_snr_floor: -10.0,
            router_snr_good: 0.0,
            colocated_default_snr: 10.0,
            max_validated_routers: 2,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.colocation_precision > 9 {
            return Err(ConfigError::Invalid(format!(
                "colocation_precision {} exceeds 9 decimal places",
                self.colocation_precision
            )));
        }
        if self.router_snr_good < self.router_snr_floor {
            return Err(ConfigError::Invalid(format!(
                "router_snr_good ({}) is below router_snr_floor ({})",
                self.router_snr_good, self.router_snr_floor
            )));
        }
        if self.max_validated_routers == 0 {
            return Err(ConfigError::Invalid(
                "max_validated_routers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lower (exclusive) SNR edges of each quality band, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalBands {
    pub good: f64,
    pub fair: f64,
    pub marginal: f64,
    pub weak: f64,
}

impl Default for SignalBands {
    fn default() -> Self {
        Self { good: 0.0, fair: -5.0, marginal: -10.0, weak: -15.0 }
    }
}

impl SignalBands {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.good >= self.fair && self.fair >= self.marginal && self.marginal >= self.weak {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!("signal bands are not descending: {:?}", self)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferencePolicy {
    /// Replace every snapshot's links with the inferred set.
    Always,
    /// Infer only for snapshots that carry no links of their own.
    #[default]
    WhenUnconfirmed,
    /// Merge links exactly as reported.
    Never,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub inference: InferenceConfig,
    pub signal_bands: SignalBands,
    pub policy: InferencePolicy,
}

impl MergeConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: MergeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.inference.validate()?;
        self.signal_bands.validate()
    }

    pub fn with_policy(mut self, policy: InferencePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{"inference": {"router_snr_floor": -12.5}, "policy": "always"}"#;
        let config = MergeConfig::from_json_str(json).unwrap();
        assert_eq!(config.inference.router_snr_floor, -12.5);
        assert_eq!(config.inference.colocation_precision, 4);
        assert_eq!(config.inference.max_validated_routers, 2);
        assert_eq!(config.signal_bands, SignalBands::default());
        assert_eq!(config.policy, InferencePolicy::Always);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let json = r#"{"inference": {"router_snr_good": -20.0}}"#;
        let err = MergeConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = MergeConfig::from_json_str(r#"{"signal_bands": {"fair": 3.0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = MergeConfig::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Decode(_)));
    }
}
