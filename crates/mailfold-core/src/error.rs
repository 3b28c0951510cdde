//! Error types for the core library.

use thiserror::Error;

use crate::classify::OracleError;
use crate::service::MailboxError;

/// Errors that abort a whole operation (a triage run, a reset, a diagnostic).
///
/// Per-message failures never surface here; they are recorded in the run
/// report instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The mailbox connection failed or became unusable.
    #[error("Mailbox transport error: {0}")]
    Transport(#[from] MailboxError),

    /// The classification oracle failed outside of per-message classification.
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
