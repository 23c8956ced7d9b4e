//! Mutual exclusion across updaters that share nothing but the backend.

use staleprobe::document::{ContainerEntry, DocumentKey};
use staleprobe::lock::LockManager;
use staleprobe::test_utils::{SimulatedBackend, init_test_logging};
use staleprobe::updater::SharedDocumentUpdater;
use staleprobe::utils::RetryPolicy;
use std::path::Path;
use std::time::Duration;

const ITEMS: u32 = 10;

async fn run_node(backend: SimulatedBackend, owner: &'static str, pause: Duration) {
    // Each node builds its own updater, as separate processes would
    let updater = SharedDocumentUpdater::new(backend, "/data");
    let key = DocumentKey::new("containers_1200");

    for index in 1..=ITEMS {
        updater.append(&key, ContainerEntry::new(owner, index)).await.unwrap();
        tokio::time::sleep(pause).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_nodes_keep_every_entry() {
    init_test_logging(None);
    let backend = SimulatedBackend::new();

    let a = tokio::spawn(run_node(backend.clone(), "node-a", Duration::from_millis(30)));
    let b = tokio::spawn(run_node(backend.clone(), "node-b", Duration::from_millis(45)));
    a.await.unwrap();
    b.await.unwrap();

    let updater = SharedDocumentUpdater::new(backend.clone(), "/data");
    let document = updater.read(&DocumentKey::new("containers_1200")).await.unwrap();
    assert_eq!(document.len(), 20);

    for owner in ["node-a", "node-b"] {
        let indices: Vec<u32> =
            document.entries().iter().filter(|e| e.name == owner).map(|e| e.index).collect();
        assert_eq!(indices, (1..=ITEMS).collect::<Vec<_>>(), "order of {owner}");
    }

    assert!(!backend.contains(Path::new("/data/containers_1200.lock")));
}

#[tokio::test(start_paused = true)]
async fn test_held_lock_blocks_other_updaters() {
    let backend = SimulatedBackend::new();
    let locks = LockManager::new(backend.clone(), "/data");
    let held = locks.acquire("containers_1200").await.unwrap();

    let updater = SharedDocumentUpdater::new(backend.clone(), "/data").with_lock_manager(
        LockManager::new(backend.clone(), "/data")
            .with_policy(RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(5))),
    );
    let pending = tokio::spawn(async move {
        let start = tokio::time::Instant::now();
        updater
            .append(&DocumentKey::new("containers_1200"), ContainerEntry::new("node-b", 1))
            .await
            .unwrap();
        start.elapsed()
    });

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    assert!(!backend.contains(Path::new("/data/containers_1200.xml")));
    locks.release(held).await;

    let waited = pending.await.unwrap();
    assert!(waited >= Duration::from_millis(1_050), "waited {waited:?}");
    assert!(waited <= Duration::from_millis(1_200), "waited {waited:?}");
    assert!(backend.contains(Path::new("/data/containers_1200.xml")));
}
