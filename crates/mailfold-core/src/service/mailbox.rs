//! The mailbox collaborator contract.
//!
//! The triage engine and the reset operator talk to the mailbox exclusively
//! through the [`Mailbox`] trait. [`ImapMailbox`](super::ImapMailbox) is the
//! production implementation; tests drive the engine with an in-memory one.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Unique identifier of a message within the selected folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u32);

impl Uid {
    /// Wraps a raw UID value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw UID value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message flags the engine manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message is flagged for attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
}

impl Flag {
    /// Protocol spelling of the flag.
    #[must_use]
    pub const fn as_imap(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
        }
    }
}

/// A folder as reported by the mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Full folder name, segments joined by `delimiter`.
    pub name: String,
    /// Hierarchy delimiter reported by the server, if any.
    pub delimiter: Option<String>,
    /// Raw folder attributes (e.g. `\Noselect`, `\HasChildren`).
    pub attributes: Vec<String>,
}

impl FolderEntry {
    /// Creates an entry with the given name and delimiter and no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: Option<&str>) -> Self {
        Self {
            name: name.into(),
            delimiter: delimiter.map(ToString::to_string),
            attributes: Vec::new(),
        }
    }

    /// Whether the folder can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect") || a.eq_ignore_ascii_case("\\NonExistent"))
    }
}

/// A message fetched with its envelope and full body.
#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    /// Message UID in the selected folder.
    pub uid: Option<Uid>,
    /// Envelope subject, if present. May still be RFC 2047 encoded.
    pub subject: Option<String>,
    /// First envelope sender formatted for display.
    pub sender: String,
    /// Whether the message carried `\Seen` when fetched.
    pub seen: bool,
    /// Full RFC 5322 message, if the server returned it.
    pub raw: Option<Vec<u8>>,
}

/// Errors reported by a [`Mailbox`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// Connection could not be established or was lost.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A call did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// Configured timeout.
        after: Duration,
    },

    /// The folder to create already exists.
    #[error("Folder already exists: {0}")]
    AlreadyExists(String),

    /// The server refused the command (`NO`/`BAD`).
    #[error("Server refused command: {0}")]
    Rejected(String),

    /// The server sent something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl MailboxError {
    /// Whether the session is unusable after this error.
    ///
    /// Fatal errors abort the current run; the next poll reconnects.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Authentication(_) | Self::Timeout { .. } | Self::Protocol(_)
        )
    }
}

/// Primitive mailbox operations used by the engine.
///
/// Every call is expected to be bounded by a timeout and to report expiry
/// as [`MailboxError::Timeout`].
#[async_trait]
pub trait Mailbox: Send {
    /// Lists every folder visible to the account.
    async fn list_folders(&mut self) -> Result<Vec<FolderEntry>, MailboxError>;

    /// Selects a folder for message operations.
    async fn select(&mut self, folder: &str) -> Result<(), MailboxError>;

    /// Leaves the selected folder.
    async fn unselect(&mut self) -> Result<(), MailboxError>;

    /// Searches the selected folder; returns matching UIDs in ascending order.
    async fn search(&mut self, criteria: &str) -> Result<Vec<Uid>, MailboxError>;

    /// Fetches envelope, flags and full body for the given UIDs.
    async fn fetch(&mut self, uids: &[Uid]) -> Result<Vec<FetchedMessage>, MailboxError>;

    /// Checks whether a folder with this exact name exists.
    async fn folder_exists(&mut self, path: &str) -> Result<bool, MailboxError>;

    /// Creates a folder.
    async fn create_folder(&mut self, path: &str) -> Result<(), MailboxError>;

    /// Deletes a folder.
    async fn delete_folder(&mut self, path: &str) -> Result<(), MailboxError>;

    /// Adds a flag to a message in the selected folder.
    async fn add_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError>;

    /// Removes a flag from a message in the selected folder.
    async fn clear_flag(&mut self, uid: Uid, flag: Flag) -> Result<(), MailboxError>;

    /// Moves messages from the selected folder to `destination`.
    async fn move_messages(&mut self, uids: &[Uid], destination: &str)
    -> Result<(), MailboxError>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<(), MailboxError>;
}
