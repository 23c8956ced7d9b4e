//! Core types shared by every staleprobe component.
//!
//! Currently this is the error layer: [`HarnessError`] for the coordination
//! core and [`ErrorContext`] / [`user_friendly_error`] for presenting failures
//! at the command line.

pub mod error;

pub use error::{ErrorContext, HarnessError, user_friendly_error};
