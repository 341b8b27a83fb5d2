use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Swap engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum overall score for two requests to count as compatible
    pub compatibility_threshold: f64,

    /// Minimum score for an edge to enter the compatibility graph
    pub edge_threshold: f64,

    /// Maximum participants in a discovered cycle or linear chain
    pub max_chain_length: usize,

    /// Stop enumeration after this many candidates
    pub max_chain_results: usize,

    /// Wall-clock budget for one discovery run, in milliseconds
    pub discovery_budget_ms: u64,

    /// Also enumerate open (non-cyclic) chains
    pub include_linear_chains: bool,

    /// Chains with at least this many participants are high priority
    pub high_priority_participants: usize,

    /// How long after execution a swap may still be rolled back
    pub rollback_window_hours: i64,

    /// Upper bound on waiting for a single notifier
    pub notification_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compatibility_threshold: 0.6,
            edge_threshold: 0.3,
            max_chain_length: 5,
            max_chain_results: 10_000,
            discovery_budget_ms: 2_000,
            include_linear_chains: true,
            high_priority_participants: 4,
            rollback_window_hours: 24,
            notification_timeout_ms: 2_000,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from an optional TOML file, then `SWAP__*` env overrides.
    ///
    /// Missing keys fall back to [`EngineConfig::default`].
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("SWAP")
                .prefix_separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::ConfigError(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the engine cannot operate with
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.compatibility_threshold) {
            return Err(crate::Error::ConfigError(format!(
                "compatibility_threshold must be within [0, 1], got {}",
                self.compatibility_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.edge_threshold) {
            return Err(crate::Error::ConfigError(format!(
                "edge_threshold must be within [0, 1], got {}",
                self.edge_threshold
            )));
        }
        if self.max_chain_length < 2 {
            return Err(crate::Error::ConfigError(
                "max_chain_length must be at least 2".to_string(),
            ));
        }
        if self.rollback_window_hours <= 0 {
            return Err(crate::Error::ConfigError(
                "rollback_window_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rollback_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.rollback_window_hours)
    }

    pub fn discovery_budget(&self) -> Duration {
        Duration::from_millis(self.discovery_budget_ms)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}
