//! Reset: drain every managed folder back into the source folder and
//! delete it.
//!
//! Folders are processed deepest first so children are gone before their
//! parents are deleted. A failure on one folder is logged and recorded;
//! the remaining folders are still processed.

use serde::Serialize;
use tracing::{info, warn};

use crate::folder::{delimiter_of, depth_of, managed_short_form};
use crate::service::{FolderEntry, Mailbox, MailboxError};
use crate::{Error, Result};

/// Proof that the user agreed to a destructive reset.
#[derive(Debug)]
pub struct Confirmation {
    _private: (),
}

impl Confirmation {
    /// Accepts `y` or `yes` in any case.
    #[must_use]
    pub fn from_answer(answer: &str) -> Option<Self> {
        let answer = answer.trim();
        (answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
            .then_some(Self { _private: () })
    }

    /// Confirmation given up front, e.g. with `--yes`.
    #[must_use]
    pub const fn assumed() -> Self {
        Self { _private: () }
    }
}

/// Managed folders to drain, deepest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPlan {
    root: String,
    folders: Vec<FolderEntry>,
}

/// What happened to one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderReset {
    /// Mailbox name.
    pub name: String,
    /// Messages moved back to the source folder.
    pub moved: usize,
    /// Whether the folder was deleted.
    pub deleted: bool,
    /// Error that stopped processing of this folder.
    pub error: Option<String>,
}

/// Summary of a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// Per-folder outcomes in processing order.
    pub folders: Vec<FolderReset>,
}

impl ResetReport {
    /// Total messages moved back.
    #[must_use]
    pub fn messages_moved(&self) -> usize {
        self.folders.iter().map(|f| f.moved).sum()
    }

    /// Number of folders deleted.
    #[must_use]
    pub fn folders_deleted(&self) -> usize {
        self.folders.iter().filter(|f| f.deleted).count()
    }

    /// Folders that could not be fully processed.
    pub fn failures(&self) -> impl Iterator<Item = &FolderReset> {
        self.folders.iter().filter(|f| f.error.is_some())
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} messages moved back, {} of {} folders deleted, {} failed",
            self.messages_moved(),
            self.folders_deleted(),
            self.folders.len(),
            self.failures().count()
        )
    }
}

impl ResetPlan {
    /// Lists the folders below `root`, deepest first.
    ///
    /// The root container itself is left alone.
    ///
    /// # Errors
    ///
    /// Returns the mailbox error if the listing fails.
    pub async fn discover<M: Mailbox + ?Sized>(
        mailbox: &mut M,
        root: &str,
    ) -> std::result::Result<Self, MailboxError> {
        let entries = mailbox.list_folders().await?;
        Ok(Self::from_listing(entries, root))
    }

    /// Builds a plan from an existing listing.
    #[must_use]
    pub fn from_listing(entries: Vec<FolderEntry>, root: &str) -> Self {
        let delimiter = delimiter_of(&entries);
        let mut folders: Vec<FolderEntry> = entries
            .into_iter()
            .filter(|e| managed_short_form(&e.name, &delimiter, root).is_some())
            .collect();
        folders.sort_by(|a, b| {
            depth_of(&b.name, &delimiter)
                .cmp(&depth_of(&a.name, &delimiter))
                .then_with(|| a.name.cmp(&b.name))
        });

        Self {
            root: root.to_string(),
            folders,
        }
    }

    /// Managed root this plan was built for.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Folder names in processing order.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.folders.iter().map(|e| e.name.as_str())
    }

    /// Number of folders to process.
    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.len()
    }

    /// Whether there is nothing to reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// Drains each folder into `source_folder` and deletes it.
    ///
    /// `source_folder` is the folder triage reads from (`INBOX` unless
    /// configured otherwise), so a reset undoes every move a run made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a fatal mailbox error. Non-fatal
    /// refusals are recorded per folder and processing continues.
    pub async fn execute<M: Mailbox + ?Sized>(
        self,
        mailbox: &mut M,
        source_folder: &str,
        _confirmation: Confirmation,
    ) -> Result<ResetReport> {
        let mut report = ResetReport::default();

        for entry in self.folders {
            info!(folder = %entry.name, "Resetting folder");
            let mut outcome = FolderReset {
                name: entry.name.clone(),
                moved: 0,
                deleted: false,
                error: None,
            };

            if let Err(e) = drain_and_delete(mailbox, &entry, source_folder, &mut outcome).await {
                if e.is_fatal() {
                    return Err(Error::Transport(e));
                }
                warn!(folder = %entry.name, error = %e, "Could not fully reset folder");
                outcome.error = Some(e.to_string());
            }
            report.folders.push(outcome);
        }

        info!(summary = %report.summary(), "Reset finished");
        Ok(report)
    }
}

async fn drain_and_delete<M: Mailbox + ?Sized>(
    mailbox: &mut M,
    entry: &FolderEntry,
    source_folder: &str,
    outcome: &mut FolderReset,
) -> std::result::Result<(), MailboxError> {
    if entry.is_selectable() {
        mailbox.select(&entry.name).await?;
        let uids = mailbox.search("ALL").await?;
        if !uids.is_empty() {
            info!(folder = %entry.name, count = uids.len(), "Moving messages back");
            mailbox.move_messages(&uids, source_folder).await?;
            outcome.moved = uids.len();
        }
        mailbox.unselect().await?;
    }

    mailbox.delete_folder(&entry.name).await?;
    outcome.deleted = true;
    Ok(())
}
