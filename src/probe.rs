//! Detection of disagreement between `exists` and directory listings.
//!
//! The bug under investigation: on the clustered volume a freshly written
//! file already shows up in the parent's listing while `exists` on the same
//! path still returns `false` for a while (a stale-negative read). Code that
//! trusts `exists` then concludes the file is missing and overwrites it.
//!
//! [`ConsistencyProber`] takes point-in-time [`Sample`]s of both query paths
//! and, when they diverge, polls until they converge or the budget runs out.
//! All operations are read-only, so probing cannot itself cause new
//! divergence. Nothing here fails: the outcome is a [`ProbeReport`] for the
//! caller to log and act on.

use crate::storage::StorageBackend;
use crate::utils::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which direction of divergence counts as an inconsistency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMode {
    /// Listed by the parent directory but `exists` says no.
    #[default]
    StaleNegative,
    /// `exists` says yes but the parent listing omits it.
    StalePositive,
    /// Either of the above.
    Either,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StaleNegative => "stale-negative",
            Self::StalePositive => "stale-positive",
            Self::Either => "either",
        })
    }
}

/// Both views of one path, taken back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub exists: bool,
    pub listed: bool,
}

impl Sample {
    pub const fn diverges(&self, mode: ProbeMode) -> bool {
        match mode {
            ProbeMode::StaleNegative => self.listed && !self.exists,
            ProbeMode::StalePositive => self.exists && !self.listed,
            ProbeMode::Either => self.exists != self.listed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No divergence at sampling time.
    Consistent,
    /// Divergence seen, then converged within the budget.
    Resolved,
    /// Divergence still present when the budget ran out.
    Unresolved,
}

/// Outcome of a probe plus the time spent waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    pub elapsed: Duration,
}

impl ProbeReport {
    const fn consistent() -> Self {
        Self {
            outcome: ProbeOutcome::Consistent,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether any divergence was observed.
    pub const fn detected(&self) -> bool {
        !matches!(self.outcome, ProbeOutcome::Consistent)
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.elapsed.as_millis();
        match self.outcome {
            ProbeOutcome::Consistent => write!(f, "consistent"),
            ProbeOutcome::Resolved => write!(f, "inconsistency resolved after {ms} ms"),
            ProbeOutcome::Unresolved => write!(f, "inconsistency unresolved after {ms} ms"),
        }
    }
}

/// Samples and waits on one backend.
#[derive(Debug, Clone)]
pub struct ConsistencyProber<B> {
    backend: B,
    mode: ProbeMode,
    policy: RetryPolicy,
}

impl<B: StorageBackend> ConsistencyProber<B> {
    /// Stale-negative prober with the default 100ms / 10s policy.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            mode: ProbeMode::default(),
            policy: RetryPolicy::probe_default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn listed(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        match self.backend.list_files(parent).await {
            Ok(files) => files.contains(path),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Listing failed, treating path as unlisted");
                false
            }
        }
    }

    /// Query `exists` and the parent listing for `path`.
    pub async fn sample(&self, path: &Path) -> Sample {
        let exists = self.backend.exists(path).await;
        let listed = self.listed(path).await;
        Sample {
            exists,
            listed,
        }
    }

    /// Point-in-time check. A `true` can be stale a moment later.
    pub async fn is_inconsistent(&self, path: &Path) -> bool {
        self.sample(path).await.diverges(self.mode)
    }

    async fn converged(&self, path: &Path) -> bool {
        match self.mode {
            ProbeMode::StaleNegative => self.backend.exists(path).await,
            ProbeMode::StalePositive => self.listed(path).await,
            ProbeMode::Either => {
                let sample = self.sample(path).await;
                sample.exists == sample.listed
            }
        }
    }

    /// Poll until the divergence for `path` has converged or the budget is
    /// spent.
    ///
    /// In stale-negative mode convergence means `exists(path)` turned true.
    pub async fn wait_for_consistency(&self, path: &Path) -> ProbeReport {
        let start = Instant::now();

        for delay in self.policy.delays() {
            if self.converged(path).await {
                let elapsed = start.elapsed();
                info!(
                    path = %path.display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Inconsistency resolved after {} ms",
                    elapsed.as_millis()
                );
                return ProbeReport {
                    outcome: ProbeOutcome::Resolved,
                    elapsed,
                };
            }

            let remaining = self.policy.remaining(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        let elapsed = start.elapsed();
        warn!(
            path = %path.display(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Inconsistency unresolved after {} ms",
            elapsed.as_millis()
        );
        ProbeReport {
            outcome: ProbeOutcome::Unresolved,
            elapsed,
        }
    }

    /// Sample once and, only if the views diverge, wait for convergence.
    pub async fn probe(&self, path: &Path) -> ProbeReport {
        let sample = self.sample(path).await;
        if !sample.diverges(self.mode) {
            debug!(path = %path.display(), exists = sample.exists, listed = sample.listed, "Consistent");
            return ProbeReport::consistent();
        }

        warn!(
            path = %path.display(),
            exists = sample.exists,
            listed = sample.listed,
            mode = %self.mode,
            "Inconsistency detected"
        );
        self.wait_for_consistency(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SimulatedBackend;
    use std::path::PathBuf;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn doc_path() -> PathBuf {
        PathBuf::from("/data/containers_1200.xml")
    }

    #[test]
    fn test_sample_divergence_by_mode() {
        let stale_negative = Sample {
            exists: false,
            listed: true,
        };
        let stale_positive = Sample {
            exists: true,
            listed: false,
        };
        let agree = Sample {
            exists: true,
            listed: true,
        };

        assert!(stale_negative.diverges(ProbeMode::StaleNegative));
        assert!(!stale_negative.diverges(ProbeMode::StalePositive));
        assert!(stale_positive.diverges(ProbeMode::StalePositive));
        assert!(!stale_positive.diverges(ProbeMode::StaleNegative));
        assert!(stale_negative.diverges(ProbeMode::Either));
        assert!(stale_positive.diverges(ProbeMode::Either));
        assert!(!agree.diverges(ProbeMode::Either));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consistent_present_and_absent() {
        let backend = SimulatedBackend::new();
        let prober = ConsistencyProber::new(backend.clone());

        assert!(!prober.is_inconsistent(&doc_path()).await);
        assert_eq!(prober.probe(&doc_path()).await.outcome, ProbeOutcome::Consistent);

        backend.insert_file(doc_path(), "<containers/>");
        assert!(!prober.is_inconsistent(&doc_path()).await);
        let report = prober.probe(&doc_path()).await;
        assert!(!report.detected());
        assert_eq!(report.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_k_intervals() {
        let backend = SimulatedBackend::new();
        backend.insert_file(doc_path(), "<containers/>");
        backend.hide_from_exists(doc_path(), INTERVAL * 7);
        let prober = ConsistencyProber::new(backend.clone());

        assert!(prober.is_inconsistent(&doc_path()).await);
        let report = prober.probe(&doc_path()).await;

        assert_eq!(report.outcome, ProbeOutcome::Resolved);
        assert!(report.elapsed >= INTERVAL * 7, "resolved too early: {:?}", report.elapsed);
        assert!(report.elapsed < INTERVAL * 8, "resolved too late: {:?}", report.elapsed);
        assert_eq!(report.to_string(), format!("inconsistency resolved after {} ms", report.elapsed.as_millis()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_after_exact_budget() {
        let backend = SimulatedBackend::new();
        backend.insert_file(doc_path(), "<containers/>");
        backend.hide_from_exists_forever(doc_path());
        let prober = ConsistencyProber::new(backend.clone());

        let report = prober.wait_for_consistency(&doc_path()).await;

        assert_eq!(report.outcome, ProbeOutcome::Unresolved);
        assert_eq!(report.elapsed, Duration::from_secs(10));
        assert!(report.detected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_budget_is_honored() {
        let backend = SimulatedBackend::new();
        backend.insert_file(doc_path(), "");
        backend.hide_from_exists_forever(doc_path());
        let prober = ConsistencyProber::new(backend)
            .with_policy(RetryPolicy::new(Duration::from_millis(40), Duration::from_millis(100)));

        let report = prober.probe(&doc_path()).await;
        assert_eq!(report.outcome, ProbeOutcome::Unresolved);
        assert_eq!(report.elapsed, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_positive_mode() {
        let backend = SimulatedBackend::new();
        backend.insert_file(doc_path(), "");
        backend.hide_from_listing(doc_path(), INTERVAL * 3);

        let negative = ConsistencyProber::new(backend.clone());
        assert!(!negative.is_inconsistent(&doc_path()).await);

        let positive = ConsistencyProber::new(backend.clone()).with_mode(ProbeMode::StalePositive);
        assert!(positive.is_inconsistent(&doc_path()).await);
        let report = positive.probe(&doc_path()).await;
        assert_eq!(report.outcome, ProbeOutcome::Resolved);
        assert!(report.elapsed >= INTERVAL * 3 && report.elapsed < INTERVAL * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_either_mode_waits_for_agreement() {
        let backend = SimulatedBackend::new();
        backend.insert_file(doc_path(), "");
        backend.hide_from_exists(doc_path(), INTERVAL * 2);
        let prober = ConsistencyProber::new(backend).with_mode(ProbeMode::Either);

        let report = prober.probe(&doc_path()).await;
        assert_eq!(report.outcome, ProbeOutcome::Resolved);
        assert!(report.elapsed >= INTERVAL * 2 && report.elapsed < INTERVAL * 3);
    }

    #[tokio::test]
    async fn test_listing_failure_counts_as_unlisted() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing-dir").join("doc.xml");
        let prober = ConsistencyProber::new(crate::storage::LocalBackend::new());

        let sample = prober.sample(&path).await;
        assert_eq!(
            sample,
            Sample {
                exists: false,
                listed: false
            }
        );
    }

    #[test]
    fn test_mode_display_matches_serde_names() {
        assert_eq!(ProbeMode::StaleNegative.to_string(), "stale-negative");
        assert_eq!(ProbeMode::StalePositive.to_string(), "stale-positive");
        assert_eq!(ProbeMode::Either.to_string(), "either");
    }
}
