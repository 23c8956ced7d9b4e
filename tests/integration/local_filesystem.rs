//! Updaters contending on a real directory, with real time.

use staleprobe::cli::create_marker;
use staleprobe::document::{ContainerEntry, DocumentKey};
use staleprobe::lock::LockManager;
use staleprobe::probe::{ConsistencyProber, ProbeOutcome};
use staleprobe::storage::LocalBackend;
use staleprobe::updater::SharedDocumentUpdater;
use staleprobe::utils::RetryPolicy;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn updater(base_dir: &Path) -> SharedDocumentUpdater<LocalBackend> {
    let backend = LocalBackend::new();
    let locks = LockManager::new(backend.clone(), base_dir)
        .with_policy(RetryPolicy::new(Duration::from_millis(5), Duration::from_secs(10)));
    SharedDocumentUpdater::new(backend, base_dir).with_lock_manager(locks)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_contending_updaters_on_local_directory() {
    let temp_dir = TempDir::new().unwrap();
    let key = DocumentKey::new("containers_1200");

    let mut tasks = Vec::new();
    for owner in ["node-a", "node-b"] {
        let updater = updater(temp_dir.path());
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            for index in 1..=10 {
                updater.append(&key, ContainerEntry::new(owner, index)).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let document = updater(temp_dir.path()).read(&key).await.unwrap();
    assert_eq!(document.len(), 20);
    for owner in ["node-a", "node-b"] {
        let indices: Vec<u32> =
            document.entries().iter().filter(|e| e.name == owner).map(|e| e.index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["containers_1200.xml".to_string()]);
}

#[tokio::test]
async fn test_local_directory_is_consistent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.txt");
    std::fs::write(&path, "").unwrap();

    let prober = ConsistencyProber::new(LocalBackend::new());
    let sample = prober.sample(&path).await;
    assert!(sample.exists);
    assert!(sample.listed);
    assert_eq!(prober.probe(&path).await.outcome, ProbeOutcome::Consistent);
}

#[tokio::test]
async fn test_marker_survives_second_create() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.txt");
    let node_a = LocalBackend::new();
    let node_b = LocalBackend::new();

    assert!(create_marker(&node_a, &path).await.unwrap());
    let before = std::fs::metadata(&path).unwrap();
    assert!(!create_marker(&node_b, &path).await.unwrap());
    let after = std::fs::metadata(&path).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        assert_eq!(before.ino(), after.ino(), "marker was replaced");
    }
    assert_eq!(before.len(), after.len());

    let names: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["test.txt".to_string()]);
}
