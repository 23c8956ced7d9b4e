//! Run configuration for the reproduction drivers.
//!
//! Settings come from three places, later ones winning:
//!
//! 1. built-in defaults (the values the harness was tuned with on the cluster)
//! 2. an optional TOML file passed with `--config`
//! 3. command-line flags and `STALEPROBE_*` environment variables
//!
//! ```toml
//! base_dir = "/mnt/shared/probe"
//! items_per_document = 20
//! update_delay_ms = 50
//! rounds = 3
//! probe_mode = "either"
//! ```

use crate::constants::{
    DEFAULT_BASE_DIR, LOCK_RETRY_INTERVAL_MS, LOCK_TIMEOUT_MS, PROBE_BUDGET_MS, PROBE_INTERVAL_MS,
};
use crate::core::HarnessError;
use crate::probe::ProbeMode;
use crate::utils::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Everything a driver needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Shared directory all cooperating processes point at.
    pub base_dir: PathBuf,

    /// Identity written into every entry. Defaults to `<HOSTNAME>-<pid>`.
    pub owner: String,

    /// Appends per document and round.
    pub items_per_document: u32,

    /// Pause between two appends.
    pub update_delay_ms: u64,

    /// Rounds to run before exiting.
    pub rounds: u32,

    pub lock_retry_interval_ms: u64,
    pub lock_timeout_ms: u64,
    pub probe_interval_ms: u64,
    pub probe_budget_ms: u64,
    pub probe_mode: ProbeMode,

    /// File created and polled by `watch`, relative to `base_dir`.
    pub watch_file: String,
    pub watch_iterations: u32,
    pub watch_interval_ms: u64,
    /// Iteration at which `watch` creates the file.
    pub watch_create_at: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            owner: default_owner(),
            items_per_document: 10,
            update_delay_ms: 0,
            rounds: 1,
            lock_retry_interval_ms: LOCK_RETRY_INTERVAL_MS,
            lock_timeout_ms: LOCK_TIMEOUT_MS,
            probe_interval_ms: PROBE_INTERVAL_MS,
            probe_budget_ms: PROBE_BUDGET_MS,
            probe_mode: ProbeMode::default(),
            watch_file: "test.txt".to_string(),
            watch_iterations: 15,
            watch_interval_ms: 1000,
            watch_create_at: 1,
        }
    }
}

/// `<HOSTNAME>-<pid>`, so entries from different nodes and from several
/// processes on one node stay distinguishable.
pub fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "process".to_string());
    format!("{}-{}", host.trim(), std::process::id())
}

impl HarnessConfig {
    /// Load from `path`, or return the defaults when no path is given.
    pub async fn load_with_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Load from a TOML file. A file that does not exist yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Reject settings that would make the retry loops meaningless.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let check = |name: &str, interval: u64, budget: u64| {
            if interval == 0 {
                return Err(HarnessError::ConfigError {
                    message: format!("{name}_interval_ms must be greater than zero"),
                });
            }
            if interval > budget {
                return Err(HarnessError::ConfigError {
                    message: format!(
                        "{name} interval ({interval} ms) exceeds its budget ({budget} ms)"
                    ),
                });
            }
            Ok(())
        };

        check("lock_retry", self.lock_retry_interval_ms, self.lock_timeout_ms)?;
        check("probe", self.probe_interval_ms, self.probe_budget_ms)?;

        if self.owner.trim().is_empty() {
            return Err(HarnessError::ConfigError {
                message: "owner must not be empty".to_string(),
            });
        }
        if self.watch_file.is_empty() || Path::new(&self.watch_file).components().count() != 1 {
            return Err(HarnessError::ConfigError {
                message: format!("watch_file '{}' must be a plain file name", self.watch_file),
            });
        }

        Ok(())
    }

    pub fn lock_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.lock_retry_interval_ms),
            Duration::from_millis(self.lock_timeout_ms),
        )
    }

    pub fn probe_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.probe_interval_ms),
            Duration::from_millis(self.probe_budget_ms),
        )
    }

    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.update_delay_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn watch_path(&self) -> PathBuf {
        self.base_dir.join(&self.watch_file)
    }
}
