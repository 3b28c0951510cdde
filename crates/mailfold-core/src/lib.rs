//! # mailfold-core
//!
//! Triage engine for `mailfold`: files mailbox messages into folders chosen
//! by a text-classification oracle.
//!
//! This crate provides:
//! - **Folder paths** - canonical, sanitized paths below a managed root
//! - **Folder cache** - run-scoped mirror of the managed hierarchy
//! - **Feature extraction** - subject, sender and a bounded body snippet
//! - **Classification** - prompt building, oracle contract, Gemini client
//! - **Triage** - the per-message pipeline with idempotent folder creation
//! - **Reset** - drains managed folders back into the inbox
//! - **Polling** - fixed-interval scheduling of triage runs
//! - **Mailbox service** - IMAP implementation of the mailbox contract

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
pub mod encoding;
mod error;
pub mod extract;
pub mod folder;
pub mod reset;
pub mod schedule;
pub mod service;
pub mod triage;

pub use classify::{ClassificationOutcome, Classifier, GeminiOracle, Oracle, OracleError};
pub use config::{Config, ImapConfig, OracleConfig, Security, TriageConfig};
pub use error::{Error, Result};
pub use extract::{MessageFeatures, extract_features};
pub use folder::{FolderCache, FolderPath, normalize};
pub use reset::{Confirmation, ResetPlan, ResetReport};
pub use schedule::Poller;
pub use service::{FetchedMessage, Flag, FolderEntry, ImapMailbox, Mailbox, MailboxError, Uid};
pub use triage::{Disposition, FolderOpError, MessageReport, RunReport, RunState, Triage};
