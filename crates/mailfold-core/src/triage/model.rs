//! Triage run data models.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Pipeline stage a message reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Envelope and body were fetched.
    Fetched,
    /// Subject, sender and snippet were derived.
    FeaturesExtracted,
    /// The oracle answered with a usable outcome.
    Classified,
    /// The answer was turned into a canonical folder path.
    Normalized,
    /// The destination folder exists.
    FolderEnsured,
    /// The message now lives in the destination folder.
    Moved,
    /// The message was left in place on purpose.
    Skipped,
    /// The message was left in place after a folder operation failed.
    Failed,
}

impl Stage {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::FeaturesExtracted => "features_extracted",
            Self::Classified => "classified",
            Self::Normalized => "normalized",
            Self::FolderEnsured => "folder_ensured",
            Self::Moved => "moved",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Why a message was left where it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The oracle answered with the skip sentinel or nothing usable.
    Classifier,
    /// The oracle signalled rate limiting.
    RateLimited(String),
    /// The oracle call failed.
    OracleFailed(String),
    /// The server returned the message without a UID.
    MissingUid,
    /// The server returned the message without a body.
    MissingBody,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifier => f.write_str("classifier chose to skip"),
            Self::RateLimited(detail) => write!(f, "rate limited: {detail}"),
            Self::OracleFailed(detail) => write!(f, "oracle failed: {detail}"),
            Self::MissingUid => f.write_str("message has no UID"),
            Self::MissingBody => f.write_str("message has no body"),
        }
    }
}

/// Final outcome for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Disposition {
    /// The message was filed.
    Moved {
        /// Destination in `Root/Segment/...` form.
        destination: String,
        /// Whether the seen flag was cleared before the move.
        unread_flag_cleared: bool,
    },
    /// The message was left in place on purpose.
    Skipped {
        /// Why.
        reason: SkipReason,
    },
    /// A folder operation failed; the message was left in place.
    Failed {
        /// Last stage completed before the failure.
        stage: Stage,
        /// Error description.
        reason: String,
    },
}

impl Disposition {
    /// Terminal stage of this outcome.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Moved { .. } => Stage::Moved,
            Self::Skipped { .. } => Stage::Skipped,
            Self::Failed { .. } => Stage::Failed,
        }
    }
}

/// Outcome for one message, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageReport {
    /// Message UID in the source folder.
    pub uid: Option<u32>,
    /// Subject shown to the oracle.
    pub subject: String,
    /// Sender shown to the oracle.
    pub sender: String,
    /// What happened.
    #[serde(flatten)]
    pub disposition: Disposition,
}

/// Summary of one triage run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Folder the messages were taken from.
    pub source_folder: String,
    /// Number of messages matching the search.
    pub examined: usize,
    /// Messages filed into a folder.
    pub moved: usize,
    /// Messages left in place on purpose.
    pub skipped: usize,
    /// Messages left in place after a failure.
    pub failed: usize,
    /// Subset of `skipped` caused by rate limiting.
    pub rate_limited: usize,
    /// Folders created during the run, in creation order.
    pub folders_created: Vec<String>,
    /// Per-message outcomes in processing order.
    pub messages: Vec<MessageReport>,
}

impl RunReport {
    /// Starts an empty report.
    #[must_use]
    pub fn new(source_folder: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            source_folder: source_folder.into(),
            examined: 0,
            moved: 0,
            skipped: 0,
            failed: 0,
            rate_limited: 0,
            folders_created: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Adds a message outcome and updates the counters.
    pub fn record(&mut self, report: MessageReport) {
        match &report.disposition {
            Disposition::Moved { .. } => self.moved += 1,
            Disposition::Skipped { reason } => {
                self.skipped += 1;
                if matches!(reason, SkipReason::RateLimited(_)) {
                    self.rate_limited += 1;
                }
            }
            Disposition::Failed { .. } => self.failed += 1,
        }
        self.messages.push(report);
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} examined, {} moved, {} skipped ({} rate limited), {} failed, {} folders created",
            self.examined,
            self.moved,
            self.skipped,
            self.rate_limited,
            self.failed,
            self.folders_created.len()
        )
    }
}
