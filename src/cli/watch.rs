//! `staleprobe watch`: the single-file reproduction.
//!
//! All nodes align on the next minute, then sample the same marker file once
//! per interval. Each node creates the marker at iteration `create_at`; the
//! interesting lines are the ones where `exists` and `listed` disagree right
//! after another node's create.

use crate::config::HarnessConfig;
use crate::probe::ConsistencyProber;
use crate::schedule::RoundScheduler;
use crate::storage::{BackendError, BackendErrorKind, LocalBackend, StorageBackend};
use anyhow::Result;
use chrono::Local;
use clap::Args;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Marker file name inside the base directory
    #[arg(long, value_name = "NAME")]
    file: Option<String>,

    /// Number of samples to take
    #[arg(long, value_name = "N")]
    iterations: Option<u32>,

    /// Pause between samples
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Iteration at which this process creates the marker
    #[arg(long, value_name = "N")]
    create_at: Option<u32>,

    /// Start immediately instead of at the next minute boundary
    #[arg(long)]
    no_align: bool,
}

impl WatchCommand {
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(file) = &self.file {
            config.watch_file = file.clone();
        }
        if let Some(iterations) = self.iterations {
            config.watch_iterations = iterations;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.watch_interval_ms = interval_ms;
        }
        if let Some(create_at) = self.create_at {
            config.watch_create_at = create_at;
        }
    }

    pub async fn execute(self, config: &HarnessConfig) -> Result<()> {
        let backend = LocalBackend::new();
        let prober = ConsistencyProber::new(backend.clone())
            .with_mode(config.probe_mode)
            .with_policy(config.probe_policy());
        let path = config.watch_path();

        if !self.no_align {
            RoundScheduler::new().wait_till_next_round_minute().await;
        }

        let mut divergent = 0u32;
        for iteration in 0..config.watch_iterations {
            if iteration == config.watch_create_at {
                // Failures are reported but never stop the watch
                match create_marker(&backend, &path).await {
                    Ok(true) => info!(path = %path.display(), "Created marker file"),
                    Ok(false) => debug!(path = %path.display(), "Marker already created by another process"),
                    Err(e) => debug!(path = %path.display(), error = %e, "Marker creation failed"),
                }
            }

            let sample = prober.sample(&path).await;
            println!(
                "File {} exists: {}, listed: {}, now: {}",
                path.display(),
                sample.exists,
                sample.listed,
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
            );

            if sample.diverges(prober.mode()) {
                divergent += 1;
                warn!(
                    path = %path.display(),
                    iteration,
                    exists = sample.exists,
                    listed = sample.listed,
                    "Inconsistency detected"
                );
            }

            tokio::time::sleep(config.watch_interval()).await;
        }

        info!(
            samples = config.watch_iterations,
            divergent,
            mode = %prober.mode(),
            "Watch finished"
        );
        Ok(())
    }
}

/// Create the marker file in place, without touching an existing one.
///
/// Returns `false` when another process created it first. The file is
/// never replaced, so nodes that already resolved it keep the same inode.
pub async fn create_marker<B: StorageBackend>(backend: &B, path: &Path) -> Result<bool, BackendError> {
    match backend.create_exclusive(path).await {
        Ok(handle) => {
            drop(handle);
            Ok(true)
        }
        Err(e) if e.kind() == BackendErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}
