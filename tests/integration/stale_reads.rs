//! The failure the harness exists to expose: a stale "not found" on load
//! turns into a silent overwrite of other nodes' entries.

use staleprobe::document::{ContainerEntry, DocumentKey};
use staleprobe::probe::{ConsistencyProber, ProbeMode, ProbeOutcome};
use staleprobe::test_utils::SimulatedBackend;
use staleprobe::updater::SharedDocumentUpdater;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

const DOC: &str = "/data/containers_0930.xml";

#[tokio::test(start_paused = true)]
async fn test_stale_negative_load_loses_other_entries() {
    let backend = SimulatedBackend::new();
    let key = DocumentKey::new("containers_0930");

    let node_a = SharedDocumentUpdater::new(backend.clone(), "/data");
    for index in 1..=3 {
        node_a.append(&key, ContainerEntry::new("node-a", index)).await.unwrap();
    }

    // node-b's view of the directory lags behind by 400 ms
    backend.hide_from_exists(DOC, Duration::from_millis(400));
    let node_b = SharedDocumentUpdater::new(backend.clone(), "/data");

    let start = Instant::now();
    let report = node_b.append(&key, ContainerEntry::new("node-b", 1)).await.unwrap();

    assert!(report.stale_read_detected());
    let probe = report.probe.unwrap();
    assert_eq!(probe.outcome, ProbeOutcome::Resolved);
    assert_eq!(probe.elapsed, Duration::from_millis(400));
    assert_eq!(start.elapsed(), Duration::from_millis(400));

    let document = node_a.read(&key).await.unwrap();
    assert_eq!(document.entries(), &[ContainerEntry::new("node-b", 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_permanently_stale_document_costs_full_probe_budget() {
    let backend = SimulatedBackend::new();
    backend.insert_file(DOC, r#"<containers><container name="node-a" index="1"/></containers>"#);
    backend.hide_from_exists_forever(DOC);

    let updater = SharedDocumentUpdater::new(backend.clone(), "/data");
    let start = Instant::now();
    let report = updater
        .append(&DocumentKey::new("containers_0930"), ContainerEntry::new("node-b", 7))
        .await
        .unwrap();

    assert_eq!(report.probe.map(|p| p.outcome), Some(ProbeOutcome::Unresolved));
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(report.entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_either_mode_reports_stale_listing() {
    let backend = SimulatedBackend::new();
    backend.insert_file("/data/test.txt", "");
    backend.hide_from_listing("/data/test.txt", Duration::from_millis(250));

    let negative = ConsistencyProber::new(backend.clone());
    assert!(!negative.is_inconsistent(Path::new("/data/test.txt")).await);

    let either = ConsistencyProber::new(backend.clone()).with_mode(ProbeMode::Either);
    let report = either.probe(Path::new("/data/test.txt")).await;
    assert_eq!(report.outcome, ProbeOutcome::Resolved);
    assert_eq!(report.elapsed, Duration::from_millis(300));
}
