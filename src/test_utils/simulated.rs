//! In-memory storage backend with programmable inconsistency.
//!
//! Real clustered filesystems only misbehave occasionally, so automated tests
//! never run against one. [`SimulatedBackend`] keeps files in a shared map and
//! lets a test open *windows* during which a path is hidden from one query
//! path but not the other:
//!
//! - [`SimulatedBackend::hide_from_exists`]: `exists` returns `false` and
//!   `read_all` fails with `NotFound` while `list_files` still reports the
//!   path (a stale-negative read)
//! - [`SimulatedBackend::hide_from_listing`]: `list_files` omits the path
//!   while `exists` and `read_all` see it (a stale-positive read)
//!
//! Windows are measured with [`tokio::time::Instant`], so under
//! `#[tokio::test(start_paused = true)]` they close at exact virtual times.
//! Exclusive creation always checks the real map, giving the same
//! create-new semantics as a local filesystem.

use crate::storage::{BackendError, StorageBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Marker returned by [`SimulatedBackend::create_exclusive`].
#[derive(Debug)]
pub struct SimulatedHandle {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
struct Window {
    path: PathBuf,
    /// `None` keeps the window open forever.
    until: Option<Instant>,
}

impl Window {
    fn covers(&self, path: &Path, now: Instant) -> bool {
        self.path == path && self.until.is_none_or(|until| now < until)
    }
}

#[derive(Debug, Default)]
struct SimState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    hidden_from_exists: Vec<Window>,
    hidden_from_listing: Vec<Window>,
    read_failures: BTreeMap<PathBuf, io::ErrorKind>,
    write_failures: BTreeMap<PathBuf, io::ErrorKind>,
    exists_calls: usize,
    create_attempts: usize,
}

impl SimState {
    fn hidden_from_exists(&self, path: &Path) -> bool {
        let now = Instant::now();
        self.hidden_from_exists.iter().any(|w| w.covers(path, now))
    }

    fn hidden_from_listing(&self, path: &Path) -> bool {
        let now = Instant::now();
        self.hidden_from_listing.iter().any(|w| w.covers(path, now))
    }
}

/// Shared in-memory directory tree. Clones share state, so two clones behave
/// like two processes mounting the same volume.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("simulated backend state poisoned")
    }

    /// Place a file directly, bypassing every window.
    pub fn insert_file(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.state().files.insert(path.into(), content.into());
    }

    /// Actual content of `path`, ignoring every window.
    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Whether `path` is actually stored, ignoring every window.
    pub fn contains(&self, path: &Path) -> bool {
        self.state().files.contains_key(path)
    }

    /// Hide `path` from `exists`/`read_all` for `duration` from now.
    pub fn hide_from_exists(&self, path: impl Into<PathBuf>, duration: Duration) {
        let window = Window {
            path: path.into(),
            until: Some(Instant::now() + duration),
        };
        self.state().hidden_from_exists.push(window);
    }

    /// Hide `path` from `exists`/`read_all` until the test ends.
    pub fn hide_from_exists_forever(&self, path: impl Into<PathBuf>) {
        let window = Window {
            path: path.into(),
            until: None,
        };
        self.state().hidden_from_exists.push(window);
    }

    /// Hide `path` from `list_files` for `duration` from now.
    pub fn hide_from_listing(&self, path: impl Into<PathBuf>, duration: Duration) {
        let window = Window {
            path: path.into(),
            until: Some(Instant::now() + duration),
        };
        self.state().hidden_from_listing.push(window);
    }

    /// Hide `path` from `list_files` until the test ends.
    pub fn hide_from_listing_forever(&self, path: impl Into<PathBuf>) {
        let window = Window {
            path: path.into(),
            until: None,
        };
        self.state().hidden_from_listing.push(window);
    }

    /// Make every `read_all` of `path` fail with `kind`.
    pub fn fail_reads(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.state().read_failures.insert(path.into(), kind);
    }

    /// Make every `write_all` of `path` fail with `kind`.
    pub fn fail_writes(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) {
        self.state().write_failures.insert(path.into(), kind);
    }

    /// Number of `exists` calls served so far.
    pub fn exists_calls(&self) -> usize {
        self.state().exists_calls
    }

    /// Number of `create_exclusive` calls served so far, failed ones included.
    pub fn create_attempts(&self) -> usize {
        self.state().create_attempts
    }
}

impl StorageBackend for SimulatedBackend {
    type Handle = SimulatedHandle;

    async fn exists(&self, path: &Path) -> bool {
        let mut state = self.state();
        state.exists_calls += 1;
        state.files.contains_key(path) && !state.hidden_from_exists(path)
    }

    async fn list_files(&self, dir: &Path) -> Result<BTreeSet<PathBuf>, BackendError> {
        let state = self.state();
        Ok(state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter(|p| !state.hidden_from_listing(p))
            .cloned()
            .collect())
    }

    async fn create_exclusive(&self, path: &Path) -> Result<SimulatedHandle, BackendError> {
        let mut state = self.state();
        state.create_attempts += 1;
        if state.files.contains_key(path) {
            return Err(BackendError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        state.files.insert(path.to_path_buf(), Vec::new());
        Ok(SimulatedHandle {
            path: path.to_path_buf(),
        })
    }

    async fn read_all(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        let state = self.state();
        if let Some(kind) = state.read_failures.get(path) {
            return Err(BackendError::from_io(path, io::Error::from(*kind)));
        }
        if state.hidden_from_exists(path) {
            return Err(BackendError::NotFound {
                path: path.to_path_buf(),
            });
        }
        state.files.get(path).cloned().ok_or_else(|| BackendError::NotFound {
            path: path.to_path_buf(),
        })
    }

    async fn write_all(&self, path: &Path, content: &[u8]) -> Result<(), BackendError> {
        let mut state = self.state();
        if let Some(kind) = state.write_failures.get(path) {
            return Err(BackendError::from_io(path, io::Error::from(*kind)));
        }
        state.files.insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), BackendError> {
        match self.state().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }
}
