//! Integration test suite for staleprobe
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **contention**: several updaters sharing one simulated backend
//! - **stale_reads**: lost updates caused by stale negative lookups
//! - **local_filesystem**: real processes-in-miniature on a temp directory
//! - **cli**: the `staleprobe` binary end to end

mod cli;
mod contention;
mod local_filesystem;
mod stale_reads;
