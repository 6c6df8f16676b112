//! Engine configuration.
//!
//! Every tunable of the simulation lives here with its production default.
//! A partial JSON document is enough to override individual values:
//!
//! ```json
//! { "seed": 42, "ticker_capacity": 10 }
//! ```

use crate::error::ConfigError;
use crate::metrics::KpiSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A named source and its starting count for the top-source tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSeed {
    pub name: String,
    pub count: u64,
}

impl SourceSeed {
    pub fn new(name: &str, count: u64) -> Self {
        Self {
            name: name.to_string(),
            count,
        }
    }
}

/// Configuration for a simulation engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting seed (None = wall-clock seed from the context)
    pub seed: Option<u64>,

    /// In-memory wave history capacity (default: 1000)
    pub history_capacity: usize,

    /// Externally projected event list capacity (default: 500)
    pub feed_capacity: usize,

    /// Length of each numeric history series (default: 600)
    pub series_capacity: usize,

    /// Ticker buffer capacity (default: 20)
    pub ticker_capacity: usize,

    /// Chance a wave takes the retry branch at its decision point
    pub retry_probability: f64,

    /// Chance a resonated wave draws from the rare-spike reward range
    pub rare_reward_probability: f64,

    /// Chance a KPI tick applies a batch payout instead of a trickle
    pub batch_payout_probability: f64,

    /// Base chance per spawn tick (scaled by the event multiplier)
    pub spawn_probability: f64,

    /// Chance a jitter tick regenerates every edge
    pub rewire_probability: f64,

    /// Waves injected by a spike
    pub spike_wave_count: usize,

    /// KPI values at construction; also the baselines for the
    /// mean-reverting metrics
    pub initial_kpi: KpiSnapshot,

    /// Top-source tally entries
    pub sources: Vec<SourceSeed>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            history_capacity: 1000,
            feed_capacity: 500,
            series_capacity: 600,
            ticker_capacity: 20,
            retry_probability: 0.05,
            rare_reward_probability: 0.10,
            batch_payout_probability: 0.15,
            spawn_probability: 0.7,
            rewire_probability: 0.3,
            spike_wave_count: 20,
            initial_kpi: KpiSnapshot::default(),
            sources: vec![
                SourceSeed::new("#LYRIN402", 234),
                SourceSeed::new("#Resonance", 189),
                SourceSeed::new("@user1", 156),
                SourceSeed::new("#Waves", 134),
                SourceSeed::new("@user2", 98),
                SourceSeed::new("#Echo", 87),
            ],
        }
    }
}

impl EngineConfig {
    /// Returns the default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks capacities and probabilities.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("history_capacity", self.history_capacity),
            ("feed_capacity", self.feed_capacity),
            ("series_capacity", self.series_capacity),
            ("ticker_capacity", self.ticker_capacity),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }
        if self.feed_capacity > self.history_capacity {
            return Err(ConfigError::invalid(
                "feed_capacity",
                format!("exceeds history_capacity ({})", self.history_capacity),
            ));
        }

        let probabilities = [
            ("retry_probability", self.retry_probability),
            ("rare_reward_probability", self.rare_reward_probability),
            ("batch_payout_probability", self.batch_payout_probability),
            ("spawn_probability", self.spawn_probability),
            ("rewire_probability", self.rewire_probability),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")));
            }
        }

        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "at least one source is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "seed": 42, "ticker_capacity": 5 }"#).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.ticker_capacity, 5);
        assert_eq!(config.history_capacity, 1000);
        assert_eq!(config.sources.len(), 6);
    }

    #[test]
    fn test_rejects_bad_probability() {
        let err = EngineConfig::from_json_str(r#"{ "retry_probability": 1.5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "retry_probability", .. }));
    }

    #[test]
    fn test_rejects_feed_larger_than_history() {
        let config = EngineConfig {
            feed_capacity: 2000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
