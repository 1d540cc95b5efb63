use crate::error::{PanforgeError, Result};
use crate::store::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline configuration with sensible defaults, optionally overlaid from a
/// TOML file and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Percent-identity thresholds, strictly descending. The first entry is
    /// the seed level; all reclustering operates on its centroids.
    pub thresholds: Vec<u8>,
    /// Concurrent remote existence checks at the fleet level.
    pub check_fanout: usize,
    /// Concurrent species builds. Builds are CPU- and bandwidth-heavy, so
    /// this pool is sized separately from `check_fanout`.
    pub build_fanout: usize,
    /// Concurrent blob transfers within one species build.
    pub transfer_fanout: usize,
    pub tool: ToolConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Clustering tool binary.
    pub binary: PathBuf,
    /// Threads per tool invocation (0 = all available).
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![99, 95, 90, 85, 80, 75],
            check_fanout: 10,
            build_fanout: 3,
            transfer_fanout: 8,
            tool: ToolConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("vsearch"),
            threads: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BuildConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|err| PanforgeError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(PanforgeError::Config(
                "at least one clustering threshold is required".to_string(),
            ));
        }
        if self
            .thresholds
            .iter()
            .any(|&percent| percent == 0 || percent > 100)
        {
            return Err(PanforgeError::Config(format!(
                "thresholds must be percentages in 1..=100: {:?}",
                self.thresholds
            )));
        }
        if self.thresholds.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(PanforgeError::Config(format!(
                "thresholds must be strictly descending: {:?}",
                self.thresholds
            )));
        }
        if self.check_fanout == 0 || self.build_fanout == 0 || self.transfer_fanout == 0 {
            return Err(PanforgeError::Config(
                "concurrency bounds must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PanforgeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The coarsest-membership, highest-identity threshold.
    pub fn seed_threshold(&self) -> u8 {
        self.thresholds[0]
    }

    /// Thresholds reclustered over the seed centroid set.
    pub fn lower_thresholds(&self) -> &[u8] {
        &self.thresholds[1..]
    }
}
