//! Global constants used throughout the staleprobe codebase.
//!
//! Retry intervals, time budgets and file naming conventions shared by the
//! lock manager, the consistency prober and the reproduction drivers.

/// Interval between exclusive-create attempts while waiting for a lock (100ms).
pub const LOCK_RETRY_INTERVAL_MS: u64 = 100;

/// Total time spent retrying a lock before giving up (50 seconds).
///
/// Long enough to outlast a full round of contending writers on a slow
/// clustered volume.
pub const LOCK_TIMEOUT_MS: u64 = 50_000;

/// Interval between `exists` polls while waiting for convergence (100ms).
pub const PROBE_INTERVAL_MS: u64 = 100;

/// Maximum time spent waiting for a divergent path to converge (10 seconds).
pub const PROBE_BUDGET_MS: u64 = 10_000;

/// Extension of lock marker files.
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// Extension of shared document files.
pub const DOCUMENT_FILE_EXTENSION: &str = "xml";

/// Prefix of time-bucketed document keys (`containers_<HHMM>`).
pub const DOCUMENT_KEY_PREFIX: &str = "containers";

/// Default shared directory, matching the mount used on the cluster nodes.
pub const DEFAULT_BASE_DIR: &str = "/data";
