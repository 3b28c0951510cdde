//! Mailbox service layer.
//!
//! The engine talks to the mail store only through the [`Mailbox`] trait.
//! [`ImapMailbox`] is the production implementation; tests drive the
//! engine with in-memory ones.

mod imap;
mod mailbox;
pub mod stream;

pub use imap::ImapMailbox;
pub use mailbox::{FetchedMessage, Flag, FolderEntry, Mailbox, MailboxError, Uid};
pub use stream::ImapStream;
