//! Read-modify-write of the shared document under its lock.
//!
//! One [`SharedDocumentUpdater::append`] call is one complete cycle:
//!
//! 1. acquire the document's lock (a timeout aborts the update)
//! 2. load the document; on "not found", probe the path first so a
//!    stale-negative read is reported (and waited out) before the document is
//!    treated as absent
//! 3. append the entry
//! 4. rewrite the whole document
//! 5. release the lock, whatever happened in steps 2 to 4
//!
//! The load is never retried after a probe, even a resolved one. Entries
//! written by other processes are then lost, which is exactly the symptom
//! the harness is built to expose.

use crate::core::HarnessError;
use crate::document::{ContainerDocument, ContainerEntry, DocumentKey};
use crate::lock::LockManager;
use crate::probe::{ConsistencyProber, ProbeReport};
use crate::storage::StorageBackend;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What a single append observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Entries in the document after the append.
    pub entries: usize,
    /// Present when the load reported "not found" and the path was probed.
    pub probe: Option<ProbeReport>,
}

impl UpdateReport {
    /// The document was loaded as missing even though the backend had shown
    /// it through another query path.
    pub fn stale_read_detected(&self) -> bool {
        self.probe.is_some_and(|p| p.detected())
    }
}

/// Appends entries to documents living in one base directory.
#[derive(Debug, Clone)]
pub struct SharedDocumentUpdater<B> {
    backend: B,
    base_dir: PathBuf,
    locks: LockManager<B>,
    prober: ConsistencyProber<B>,
}

impl<B: StorageBackend> SharedDocumentUpdater<B> {
    /// Updater with default lock and probe policies; documents and their
    /// locks live side by side in `base_dir`.
    pub fn new(backend: B, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            locks: LockManager::new(backend.clone(), base_dir.clone()),
            prober: ConsistencyProber::new(backend.clone()),
            backend,
            base_dir,
        }
    }

    #[must_use]
    pub fn with_lock_manager(mut self, locks: LockManager<B>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn with_prober(mut self, prober: ConsistencyProber<B>) -> Self {
        self.prober = prober;
        self
    }

    pub fn document_path(&self, key: &DocumentKey) -> PathBuf {
        key.document_path(&self.base_dir)
    }

    /// Load the current content of a document without locking it.
    pub async fn read(&self, key: &DocumentKey) -> Result<ContainerDocument, HarnessError> {
        let path = self.document_path(key);
        let bytes = self.backend.read_all(&path).await?;
        decode(&path, &bytes)
    }

    /// Append `entry` to the document `key` in one locked cycle.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::LockTimeout`] if the lock is not acquired in time
    /// - [`HarnessError::Backend`] for load failures other than "not found"
    ///   and for any write failure
    /// - [`HarnessError::Document`] if the existing document cannot be parsed
    pub async fn append(
        &self,
        key: &DocumentKey,
        entry: ContainerEntry,
    ) -> Result<UpdateReport, HarnessError> {
        let lock = self.locks.acquire(key.as_str()).await?;
        let result = self.append_locked(key, entry).await;
        self.locks.release(lock).await;
        result
    }

    async fn append_locked(
        &self,
        key: &DocumentKey,
        entry: ContainerEntry,
    ) -> Result<UpdateReport, HarnessError> {
        let path = self.document_path(key);

        let (mut document, probe) = match self.backend.read_all(&path).await {
            Ok(bytes) => (decode(&path, &bytes)?, None),
            Err(e) if e.is_not_found() => {
                let report = self.prober.probe(&path).await;
                if report.detected() {
                    warn!(
                        document = %key,
                        outcome = %report,
                        "Document load failed with not found although the file is visible; starting from an empty document"
                    );
                } else {
                    debug!(document = %key, "Document does not exist yet");
                }
                (ContainerDocument::new(), Some(report))
            }
            Err(e) => return Err(e.into()),
        };

        debug!(document = %key, name = %entry.name, index = entry.index, "Appending entry");
        document.push(entry);

        let content = document.to_xml().map_err(|e| HarnessError::Document {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.backend.write_all(&path, &content).await?;

        Ok(UpdateReport {
            entries: document.len(),
            probe,
        })
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<ContainerDocument, HarnessError> {
    ContainerDocument::from_xml(bytes).map_err(|e| HarnessError::Document {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
