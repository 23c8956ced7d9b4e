//! Cross-process mutual exclusion through exclusive file creation.
//!
//! Independent processes on different nodes share nothing but the directory,
//! so the only usable primitive is "create this file unless it already
//! exists". A lock named `containers_1200` is the marker file
//! `<lock_dir>/containers_1200.lock`:
//!
//! - **Unlocked**: no marker file
//! - **Acquiring**: [`LockManager::acquire`] retries the exclusive create at a
//!   fixed interval until it succeeds or the budget runs out
//! - **Locked**: the caller owns a [`LockHandle`] that keeps the file open
//! - back to **Unlocked** through [`LockManager::release`], which closes and
//!   removes the marker
//!
//! Exclusivity is only as strong as the backend's create-new guarantee. On a
//! volume with stale metadata two nodes can both succeed; that is one of the
//! failures this harness exists to surface.

use crate::constants::LOCK_FILE_EXTENSION;
use crate::core::HarnessError;
use crate::storage::{BackendErrorKind, StorageBackend};
use crate::utils::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Proof of ownership of a named lock.
///
/// Must be handed back to [`LockManager::release`]. Dropping it instead closes
/// the file but leaves the marker behind, which blocks every other process
/// until someone removes it by hand.
#[derive(Debug)]
pub struct LockHandle<H> {
    name: String,
    path: PathBuf,
    file: Option<H>,
    acquired_at: Instant,
    released: bool,
}

impl<H> LockHandle<H> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How long the lock has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl<H> Drop for LockHandle<H> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                lock_name = %self.name,
                lock_path = %self.path.display(),
                "Lock handle dropped without release, marker file left behind"
            );
        }
    }
}

/// Acquires and releases named locks inside one directory.
#[derive(Debug, Clone)]
pub struct LockManager<B> {
    backend: B,
    lock_dir: PathBuf,
    policy: RetryPolicy,
}

impl<B: StorageBackend> LockManager<B> {
    /// Manager using the default 100ms / 50s retry policy.
    pub fn new(backend: B, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            lock_dir: lock_dir.into(),
            policy: RetryPolicy::lock_default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `<lock_dir>/<name>.lock`
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.lock_dir.join(format!("{name}.{LOCK_FILE_EXTENSION}"))
    }

    /// Acquire the lock `name`, retrying while another holder owns it.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::LockTimeout`] once the retry budget is spent
    /// - [`HarnessError::Backend`] if the create fails for any reason other
    ///   than the marker already existing
    pub async fn acquire(&self, name: &str) -> Result<LockHandle<B::Handle>, HarnessError> {
        let lock_path = self.lock_path(name);
        debug!(lock_name = %name, max_attempts = self.policy.max_attempts(), "Waiting for lock");

        let start = Instant::now();
        let mut attempts: u64 = 0;

        for delay in self.policy.delays() {
            attempts += 1;

            match self.backend.create_exclusive(&lock_path).await {
                Ok(file) => {
                    debug!(
                        lock_name = %name,
                        attempts,
                        wait_ms = start.elapsed().as_millis() as u64,
                        "Lock acquired"
                    );
                    return Ok(LockHandle {
                        name: name.to_string(),
                        path: lock_path,
                        file: Some(file),
                        acquired_at: Instant::now(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == BackendErrorKind::AlreadyExists => {
                    // Check remaining time before sleeping to avoid exceeding the budget
                    let remaining = self.policy.remaining(start.elapsed());
                    if remaining.is_zero() {
                        break;
                    }
                    tokio::time::sleep(delay.min(remaining)).await;
                }
                Err(e) => {
                    error!(lock_name = %name, error = %e, "Failed to create lock file");
                    return Err(e.into());
                }
            }
        }

        let waited = start.elapsed();
        error!(
            lock_name = %name,
            attempts,
            waited_ms = waited.as_millis() as u64,
            "Lock acquisition failed"
        );
        Err(HarnessError::LockTimeout {
            name: name.to_string(),
            waited,
        })
    }

    /// Close and remove the marker file.
    ///
    /// A marker that is already gone is fine. Any other failure is logged:
    /// the caller's work is done, and the other processes will report the
    /// stuck lock through their own timeouts.
    pub async fn release(&self, mut lock: LockHandle<B::Handle>) {
        drop(lock.file.take());

        match self.backend.delete(&lock.path).await {
            Ok(()) => {
                debug!(
                    lock_name = %lock.name,
                    held_ms = lock.held_for().as_millis() as u64,
                    "Lock released"
                );
            }
            Err(e) if e.is_not_found() => {
                debug!(lock_name = %lock.name, "Lock file already removed");
            }
            Err(e) => {
                warn!(lock_name = %lock.name, error = %e, "Failed to remove lock file");
            }
        }

        lock.released = true;
    }
}
