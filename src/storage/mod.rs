//! Storage backend abstraction for the shared directory.
//!
//! Everything the harness does to the shared volume goes through
//! [`StorageBackend`]. The contract is deliberately small: existence checks,
//! directory listings, exclusive creation, whole-file reads and writes, and
//! deletion. A backend is allowed to be *inconsistent*: a path can be visible
//! through [`StorageBackend::list_files`] while [`StorageBackend::exists`]
//! still reports it missing (or the converse) for a bounded but unknown time.
//! Detecting exactly that is the job of [`crate::probe`].
//!
//! Two implementations exist:
//! - [`LocalBackend`] talks to the OS filesystem through `tokio::fs`
//! - `SimulatedBackend` (in `test_utils`) keeps files in memory and lets tests
//!   program inconsistency windows

mod local;

pub use local::LocalBackend;

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Coarse classification of a backend failure.
///
/// Callers branch on this instead of inspecting error identity: `NotFound`
/// on a load triggers a consistency probe, `AlreadyExists` on an exclusive
/// create means "someone else holds the lock".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    AlreadyExists,
    Io,
}

/// A failed backend operation on a specific path.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("File not found: {}", path.display())]
    NotFound {
        path: PathBuf,
    },

    #[error("File already exists: {}", path.display())]
    AlreadyExists {
        path: PathBuf,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    /// Classify an [`io::Error`] raised while operating on `path`.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path,
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                path,
            },
            _ => Self::Io {
                path,
                source,
            },
        }
    }

    pub const fn kind(&self) -> BackendErrorKind {
        match self {
            Self::NotFound {
                ..
            } => BackendErrorKind::NotFound,
            Self::AlreadyExists {
                ..
            } => BackendErrorKind::AlreadyExists,
            Self::Io {
                ..
            } => BackendErrorKind::Io,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound {
                path,
            }
            | Self::AlreadyExists {
                path,
            }
            | Self::Io {
                path,
                ..
            } => path,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), BackendErrorKind::NotFound)
    }
}

/// The shared directory as seen by one cooperating process.
///
/// Implementations must be cheap to clone (share state internally) so the
/// lock manager, prober and updater can each hold their own copy.
pub trait StorageBackend: Clone + Send + Sync + 'static {
    /// Token proving an exclusive create succeeded. Dropping it closes the
    /// underlying file but does not remove it.
    type Handle: Send + Sync + 'static;

    /// Point-in-time existence check for a regular file.
    ///
    /// Never fails: any error is reported as `false`, the same way a
    /// platform `exists` call behaves.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;

    /// Paths of the regular files directly inside `dir`.
    fn list_files(
        &self,
        dir: &Path,
    ) -> impl Future<Output = Result<BTreeSet<PathBuf>, BackendError>> + Send;

    /// Create `path`, failing with [`BackendError::AlreadyExists`] if it is
    /// already present.
    fn create_exclusive(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::Handle, BackendError>> + Send;

    fn read_all(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>, BackendError>> + Send;

    /// Replace the whole content of `path`. Readers never observe a partial
    /// write.
    fn write_all(
        &self,
        path: &Path,
        content: &[u8],
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete(&self, path: &Path) -> impl Future<Output = Result<(), BackendError>> + Send;
}
