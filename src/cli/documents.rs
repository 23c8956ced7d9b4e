//! `staleprobe documents`: the shared-document reproduction.
//!
//! Each round every node appends `items_per_document` entries to
//! `containers_<HHMM>.xml`, taking and releasing the document lock once per
//! entry to maximize contention. With a consistent backend the document ends
//! the round with `nodes * items` entries; a stale-negative load makes a node
//! start over from an empty document and the entries of the other nodes
//! disappear.

use crate::config::HarnessConfig;
use crate::document::{ContainerEntry, DocumentKey};
use crate::lock::LockManager;
use crate::probe::ConsistencyProber;
use crate::schedule::RoundScheduler;
use crate::storage::{LocalBackend, StorageBackend};
use crate::updater::SharedDocumentUpdater;
use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct DocumentsCommand {
    /// Number of rounds to run
    #[arg(long, value_name = "N")]
    rounds: Option<u32>,

    /// Entries appended per round
    #[arg(long, value_name = "N")]
    items: Option<u32>,

    /// Pause between two appends
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Identity written into this process's entries
    #[arg(long, env = "STALEPROBE_OWNER")]
    owner: Option<String>,

    /// Start rounds immediately instead of at minute boundaries
    #[arg(long)]
    no_align: bool,
}

/// Outcome of one round, as printed to stdout.
#[derive(Debug, Default)]
struct RoundSummary {
    appended: u32,
    stale_reads: u32,
    document_entries: Option<usize>,
    own_entries: Option<usize>,
}

impl DocumentsCommand {
    pub fn apply_overrides(&self, config: &mut HarnessConfig) {
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(items) = self.items {
            config.items_per_document = items;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.update_delay_ms = delay_ms;
        }
        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
    }

    pub async fn execute(self, config: &HarnessConfig) -> Result<()> {
        let updater = build_updater(LocalBackend::new(), config);
        let scheduler = RoundScheduler::new();

        for round in 1..=config.rounds {
            let start = if self.no_align {
                scheduler.now()
            } else {
                scheduler.wait_till_next_round_minute().await
            };
            let key = DocumentKey::for_round(&start);
            info!(round, document = %key, owner = %config.owner, "Round started");

            let summary = run_round(&updater, &key, config)
                .await
                .with_context(|| format!("Round {round} failed on document {key}"))?;

            println!(
                "Round {round}: {key} appended {} entries, {} stale reads, document has {} entries ({} from {})",
                summary.appended,
                summary.stale_reads,
                summary.document_entries.map_or_else(|| "?".to_string(), |n| n.to_string()),
                summary.own_entries.map_or_else(|| "?".to_string(), |n| n.to_string()),
                config.owner
            );
        }

        Ok(())
    }
}

/// Updater wired with the configured lock and probe policies.
pub(crate) fn build_updater<B: StorageBackend>(
    backend: B,
    config: &HarnessConfig,
) -> SharedDocumentUpdater<B> {
    let locks = LockManager::new(backend.clone(), &config.base_dir).with_policy(config.lock_policy());
    let prober = ConsistencyProber::new(backend.clone())
        .with_mode(config.probe_mode)
        .with_policy(config.probe_policy());

    SharedDocumentUpdater::new(backend, &config.base_dir).with_lock_manager(locks).with_prober(prober)
}

async fn run_round<B: StorageBackend>(
    updater: &SharedDocumentUpdater<B>,
    key: &DocumentKey,
    config: &HarnessConfig,
) -> Result<RoundSummary> {
    let mut summary = RoundSummary::default();

    for index in 1..=config.items_per_document {
        let report = updater.append(key, ContainerEntry::new(config.owner.as_str(), index)).await?;
        summary.appended += 1;
        if report.stale_read_detected() {
            summary.stale_reads += 1;
        }

        if index < config.items_per_document && !config.update_delay().is_zero() {
            tokio::time::sleep(config.update_delay()).await;
        }
    }

    // Unlocked read-back: other nodes may still be appending
    match updater.read(key).await {
        Ok(document) => {
            let own = document.entries().iter().filter(|e| e.name == config.owner).count();
            if own < summary.appended as usize {
                warn!(
                    document = %key,
                    appended = summary.appended,
                    remaining = own,
                    "Entries written by this process were lost"
                );
            }
            summary.document_entries = Some(document.len());
            summary.own_entries = Some(own);
        }
        Err(e) => warn!(document = %key, error = %e, "Could not read back document"),
    }

    Ok(summary)
}
