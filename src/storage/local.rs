//! [`StorageBackend`] over the OS filesystem.

use super::{BackendError, StorageBackend};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Backend for a directory mounted on the local machine (or a network/cluster
/// volume mounted like one).
///
/// Writes go to a sibling temp file that is renamed over the target, so
/// readers on other nodes never see a half-written document.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub const fn new() -> Self {
        Self
    }
}

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `<name>.<pid>.<seq>.tmp`, unique per call within the process.
fn temp_path_for(path: &Path) -> PathBuf {
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{seq}.tmp", std::process::id()));
    path.with_file_name(name)
}

impl StorageBackend for LocalBackend {
    type Handle = File;

    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn list_files(&self, dir: &Path) -> Result<BTreeSet<PathBuf>, BackendError> {
        let mut entries = fs::read_dir(dir).await.map_err(|e| BackendError::from_io(dir, e))?;
        let mut files = BTreeSet::new();

        while let Some(entry) = entries.next_entry().await.map_err(|e| BackendError::from_io(dir, e))? {
            // Entries can vanish between readdir and stat on a shared volume
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_file() {
                files.insert(entry.path());
            }
        }

        Ok(files)
    }

    async fn create_exclusive(&self, path: &Path) -> Result<File, BackendError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| BackendError::from_io(path, e))
    }

    async fn read_all(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        fs::read(path).await.map_err(|e| BackendError::from_io(path, e))
    }

    async fn write_all(&self, path: &Path, content: &[u8]) -> Result<(), BackendError> {
        let temp_path = temp_path_for(path);

        {
            let mut file =
                File::create(&temp_path).await.map_err(|e| BackendError::from_io(&temp_path, e))?;
            file.write_all(content).await.map_err(|e| BackendError::from_io(&temp_path, e))?;
            file.sync_all().await.map_err(|e| BackendError::from_io(&temp_path, e))?;
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BackendError::from_io(path, e));
        }

        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), BackendError> {
        fs::remove_file(path).await.map_err(|e| BackendError::from_io(path, e))
    }
}
