//! Test utilities for staleprobe
//!
//! [`SimulatedBackend`] is an in-memory [`StorageBackend`](crate::storage::StorageBackend)
//! whose `exists()` and listing views can be made to lag behind the real
//! content for a chosen duration. Combined with tokio's paused clock it makes
//! every stale-read scenario deterministic.
//!
//! ```rust,no_run
//! use staleprobe::test_utils::SimulatedBackend;
//! use std::time::Duration;
//!
//! let backend = SimulatedBackend::new();
//! backend.insert_file("/data/containers_1200.xml", "<containers/>");
//! backend.hide_from_exists("/data/containers_1200.xml", Duration::from_millis(300));
//! ```

pub mod simulated;

pub use simulated::{SimulatedBackend, SimulatedHandle};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`. With neither, logging stays off.
///
/// ```bash
/// RUST_LOG=staleprobe=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
