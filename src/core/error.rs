//! Error handling for staleprobe
//!
//! Two layers, following the same split everywhere in the crate:
//! - [`HarnessError`] is the typed error returned by the coordination core
//!   (lock manager, document updater). Callers branch on its variants.
//! - [`ErrorContext`] wraps an error with details and a suggestion for the
//!   terminal. [`user_friendly_error`] builds one from any [`anyhow::Error`]
//!   reaching `main`.
//!
//! A stale read that never converges is *not* an error: it is reported through
//! the log and the update continues. See [`crate::probe`].

use crate::storage::{BackendError, BackendErrorKind};
use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the coordination core.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The lock file could not be created exclusively within the retry
    /// budget. Fatal for the current update and therefore for the round.
    #[error("Timeout acquiring lock '{name}' after {waited:?}")]
    LockTimeout {
        /// Lock name (the document key)
        name: String,
        /// Time spent retrying
        waited: Duration,
    },

    /// A backend operation failed with something other than a recoverable
    /// "not found" on load.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Document content could not be decoded or encoded.
    #[error("Invalid document {}: {reason}", path.display())]
    Document {
        path: PathBuf,
        reason: String,
    },

    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },
}

/// An error plus the hints shown to the user.
#[derive(Debug)]
pub struct ErrorContext {
    /// Rendered error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

fn backend_error_context(message: String, error: &BackendError) -> ErrorContext {
    match error.kind() {
        BackendErrorKind::NotFound => ErrorContext::new(message)
            .with_suggestion("Check that the base directory exists and is mounted on this node")
            .with_details("A required file or directory could not be found"),
        BackendErrorKind::AlreadyExists => ErrorContext::new(message)
            .with_details("Another process created the file first"),
        BackendErrorKind::Io => ErrorContext::new(message)
            .with_suggestion("Check permissions and free space on the shared volume")
            .with_details("The storage backend rejected the operation; the round was aborted"),
    }
}

/// Convert any error into a user-facing [`ErrorContext`].
///
/// The full `anyhow` chain is kept in the message so context added with
/// `.context(...)` is not lost.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = format!("{error:#}");

    if let Some(harness_error) = error.downcast_ref::<HarnessError>() {
        return match harness_error {
            HarnessError::LockTimeout {
                name,
                ..
            } => ErrorContext::new(message)
                .with_suggestion(format!(
                    "Check for a leftover '{name}.lock' from a crashed process and remove it, or raise lock_timeout_ms"
                ))
                .with_details("Another process held the document lock for the whole retry budget"),
            HarnessError::Backend(backend) => backend_error_context(message, backend),
            HarnessError::Document {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("Remove or repair the document file; a new one is created on the next update")
                .with_details("The shared document is not a valid containers XML document"),
            HarnessError::ConfigError {
                ..
            } => ErrorContext::new(message)
                .with_suggestion("Check the configuration file and command-line flags"),
        };
    }

    if let Some(backend) = error.downcast_ref::<BackendError>() {
        return backend_error_context(message, backend);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(message)
                .with_suggestion("Check ownership and permissions of the base directory");
        }
    }

    ErrorContext::new(message)
}
