//! `staleprobe probe <PATH>`: check one path now.

use crate::config::HarnessConfig;
use crate::probe::ConsistencyProber;
use crate::storage::LocalBackend;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ProbeCommand {
    /// Path to check; relative paths are resolved against the base directory
    path: PathBuf,
}

impl ProbeCommand {
    pub async fn execute(self, config: &HarnessConfig) -> Result<()> {
        let path =
            if self.path.is_absolute() { self.path } else { config.base_dir.join(self.path) };

        let prober = ConsistencyProber::new(LocalBackend::new())
            .with_mode(config.probe_mode)
            .with_policy(config.probe_policy());

        let sample = prober.sample(&path).await;
        println!("{}: exists={}, listed={}", path.display(), sample.exists, sample.listed);

        let report = prober.probe(&path).await;
        println!("{report}");

        Ok(())
    }
}
