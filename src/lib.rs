//! staleprobe reproduces stale existence checks on clustered storage.
//!
//! Several processes, usually one per node, share one directory. They take
//! turns appending to a shared XML document under an exclusive-create file
//! lock and report every time `exists()` disagrees with the directory
//! listing. On a consistent filesystem the document ends each round with
//! every process's entries; on a filesystem with stale negative lookups a
//! process loads "nothing", starts from an empty document and overwrites the
//! work of the others.
//!
//! # Modules
//!
//! - [`storage`] - the [`storage::StorageBackend`] seam and the local filesystem backend
//! - [`lock`] - cross-process mutual exclusion through marker files
//! - [`probe`] - bounded waiting for `exists()` and the listing to agree
//! - [`updater`] - lock, load, append, write, unlock
//! - [`schedule`] - minute-boundary alignment of rounds
//! - [`document`] - the `containers` XML document
//! - [`config`] - TOML configuration with CLI overrides
//! - [`cli`] - the `staleprobe` command line
//!
//! # Example
//!
//! ```rust,no_run
//! use staleprobe::document::{ContainerEntry, DocumentKey};
//! use staleprobe::storage::LocalBackend;
//! use staleprobe::updater::SharedDocumentUpdater;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let updater = SharedDocumentUpdater::new(LocalBackend::new(), "/mnt/shared");
//! let report = updater
//!     .append(&DocumentKey::new("containers_1200"), ContainerEntry::new("node-a", 1))
//!     .await?;
//! if report.stale_read_detected() {
//!     eprintln!("stale read: {:?}", report.probe);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod document;
pub mod lock;
pub mod probe;
pub mod schedule;
pub mod storage;
pub mod updater;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
