//! Command-line interface for staleprobe.
//!
//! Every cooperating node runs the same binary against the same shared
//! directory. Two reproduction drivers and one diagnostic are available:
//!
//! - `watch` - create one marker file and sample `exists` against the
//!   directory listing every second
//! - `documents` - append entries to the round's shared XML document under
//!   a file lock, reporting stale reads on load
//! - `probe` - one-shot consistency check of a single path
//!
//! ```bash
//! # On every node, within the same minute:
//! staleprobe --base-dir /mnt/shared documents --rounds 3 --items 20
//! ```
//!
//! Diagnostics (detected, resolved and unresolved inconsistencies, lock
//! failures) go to stderr through `tracing`; results go to stdout.

mod documents;
mod probe;
mod watch;

use crate::config::HarnessConfig;
use crate::probe::ProbeMode;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use documents::DocumentsCommand;
pub use probe::ProbeCommand;
pub use watch::{WatchCommand, create_marker};

#[derive(Parser, Debug)]
#[command(
    name = "staleprobe",
    about = "Reproduce stale existence checks on shared storage",
    version,
    long_about = "staleprobe coordinates several processes over one shared directory and reports \
                  whenever exists() disagrees with the directory listing."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "STALEPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Shared directory used by all cooperating processes
    #[arg(long, global = true, env = "STALEPROBE_BASE_DIR", value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Which divergence between exists() and the listing is reported
    #[arg(long, global = true, value_enum)]
    probe_mode: Option<ProbeMode>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a marker file and watch whether exists() agrees with the listing
    Watch(WatchCommand),

    /// Append entries to the round's shared document under a file lock
    Documents(DocumentsCommand),

    /// Check a single path once
    Probe(ProbeCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        init_logging(self.log_level());

        let mut config = HarnessConfig::load_with_optional(self.config.as_deref()).await?;
        self.apply_overrides(&mut config);
        config.validate()?;

        self.execute_with_config(config).await
    }

    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Fold global and per-command flags into `config`.
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(mode) = self.probe_mode {
            config.probe_mode = mode;
        }

        match &self.command {
            Commands::Watch(cmd) => cmd.apply_overrides(config),
            Commands::Documents(cmd) => cmd.apply_overrides(config),
            Commands::Probe(_) => {}
        }
    }

    pub async fn execute_with_config(self, config: HarnessConfig) -> Result<()> {
        match self.command {
            Commands::Watch(cmd) => cmd.execute(&config).await,
            Commands::Documents(cmd) => cmd.execute(&config).await,
            Commands::Probe(cmd) => cmd.execute(&config).await,
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
