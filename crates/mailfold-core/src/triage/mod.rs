//! Triage orchestrator.
//!
//! Drives every message of the source folder through
//! `Fetched → FeaturesExtracted → Classified → Normalized → FolderEnsured → Moved`,
//! stopping early at `Skipped` or `Failed`. Per-message problems are
//! recorded in the [`RunReport`] and never abort the batch; only fatal
//! transport errors end a run early.
//!
//! # Example
//!
//! ```ignore
//! use mailfold_core::{Classifier, GeminiOracle, ImapMailbox, Triage};
//!
//! let mut mailbox = ImapMailbox::connect(&config.imap).await?;
//! let classifier = Classifier::new(GeminiOracle::new(oracle_config)?, &config.triage.root);
//! let triage = Triage::new(classifier, config.triage.clone());
//!
//! let report = triage.run(&mut mailbox).await?;
//! println!("{}", report.summary());
//! ```

mod model;

use tracing::{Instrument, debug, info, info_span, warn};

pub use model::{Disposition, MessageReport, RunReport, SkipReason, Stage};

use crate::classify::{ClassificationOutcome, Classifier, Oracle};
use crate::config::TriageConfig;
use crate::extract::{MessageFeatures, extract_features};
use crate::folder::{FolderCache, FolderPath};
use crate::service::{FetchedMessage, Flag, Mailbox, MailboxError, Uid};
use crate::{Error, Result};

/// A folder operation that left the message in place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FolderOpError {
    /// A folder could not be checked or created.
    #[error("Cannot ensure folder {path}: {source}")]
    Ensure {
        /// Mailbox name of the folder.
        path: String,
        /// Underlying mailbox error.
        source: MailboxError,
    },

    /// The message could not be moved.
    #[error("Cannot move message to {path}: {source}")]
    Move {
        /// Mailbox name of the destination.
        path: String,
        /// Underlying mailbox error.
        source: MailboxError,
    },
}

impl FolderOpError {
    /// The underlying mailbox error.
    #[must_use]
    pub const fn source_error(&self) -> &MailboxError {
        match self {
            Self::Ensure { source, .. } | Self::Move { source, .. } => source,
        }
    }

    /// Whether the session is unusable after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.source_error().is_fatal()
    }
}

/// Mutable state scoped to one run.
#[derive(Debug, Clone)]
pub struct RunState {
    cache: FolderCache,
    delimiter: String,
    backoff_pending: bool,
    created: Vec<String>,
}

impl RunState {
    /// Creates run state from a seeded cache and the server's delimiter.
    #[must_use]
    pub fn new(cache: FolderCache, delimiter: impl Into<String>) -> Self {
        Self {
            cache,
            delimiter: delimiter.into(),
            backoff_pending: false,
            created: Vec::new(),
        }
    }

    /// Builds run state from a live folder listing.
    ///
    /// # Errors
    ///
    /// Returns the mailbox error if the listing fails.
    pub async fn load<M: Mailbox + ?Sized>(
        mailbox: &mut M,
        root: &str,
    ) -> std::result::Result<Self, MailboxError> {
        let entries = mailbox.list_folders().await?;
        let (cache, delimiter) = FolderCache::from_listing(&entries, root);
        debug!(known = cache.len(), %delimiter, "Seeded folder cache");
        Ok(Self::new(cache, delimiter))
    }

    /// Folders believed to exist below the root.
    #[must_use]
    pub const fn cache(&self) -> &FolderCache {
        &self.cache
    }

    /// Hierarchy delimiter in use.
    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Mailbox names created so far, in creation order.
    #[must_use]
    pub fn created(&self) -> &[String] {
        &self.created
    }
}

/// The triage engine.
#[derive(Debug)]
pub struct Triage<O> {
    classifier: Classifier<O>,
    config: TriageConfig,
}

impl<O: Oracle> Triage<O> {
    /// Creates an engine with the given classifier and settings.
    pub const fn new(classifier: Classifier<O>, config: TriageConfig) -> Self {
        Self { classifier, config }
    }

    /// Engine settings.
    pub const fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Processes every message matching the configured search once.
    ///
    /// The folder cache is rebuilt from a live listing at the start of
    /// every run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when listing, selecting, searching or
    /// fetching fails, or when any later mailbox call reports a fatal error.
    pub async fn run<M: Mailbox + ?Sized>(&self, mailbox: &mut M) -> Result<RunReport> {
        let mut report = RunReport::new(&self.config.source_folder);
        let mut state = RunState::load(mailbox, &self.config.root).await?;

        mailbox.select(&self.config.source_folder).await?;
        let uids = mailbox.search(&self.config.search).await?;
        report.examined = uids.len();
        info!(
            folder = %self.config.source_folder,
            count = uids.len(),
            "Starting triage run"
        );

        for batch in uids.chunks(self.config.fetch_batch.max(1)) {
            let messages = mailbox.fetch(batch).await?;
            for message in messages {
                let outcome = self.process(mailbox, &mut state, message).await?;
                report.record(outcome);
            }
        }

        report.folders_created = state.created;
        report.finish();
        info!(summary = %report.summary(), "Triage run finished");
        Ok(report)
    }

    /// Runs one message through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] only for fatal mailbox errors; every
    /// other problem is reported in the returned [`MessageReport`].
    pub async fn process<M: Mailbox + ?Sized>(
        &self,
        mailbox: &mut M,
        state: &mut RunState,
        message: FetchedMessage,
    ) -> Result<MessageReport> {
        let span = info_span!(
            "message",
            uid = message.uid.map_or(0, Uid::get),
        );
        self.process_inner(mailbox, state, message)
            .instrument(span)
            .await
    }

    async fn process_inner<M: Mailbox + ?Sized>(
        &self,
        mailbox: &mut M,
        state: &mut RunState,
        message: FetchedMessage,
    ) -> Result<MessageReport> {
        let features = extract_features(
            message.subject.as_deref(),
            &message.sender,
            message.raw.as_deref().unwrap_or_default(),
            self.config.snippet_chars,
        );
        let report = |disposition: Disposition| {
            log_outcome(&disposition);
            MessageReport {
                uid: message.uid.map(Uid::get),
                subject: features.subject.clone(),
                sender: features.sender.clone(),
                disposition,
            }
        };

        let Some(uid) = message.uid else {
            return Ok(report(Disposition::Skipped {
                reason: SkipReason::MissingUid,
            }));
        };
        if message.raw.is_none() {
            return Ok(report(Disposition::Skipped {
                reason: SkipReason::MissingBody,
            }));
        }
        debug!(stage = Stage::FeaturesExtracted.as_str(), subject = %features.subject);

        let outcome = self.classify(state, &features).await;
        let destination = match &outcome {
            ClassificationOutcome::Skip => {
                return Ok(report(Disposition::Skipped {
                    reason: SkipReason::Classifier,
                }));
            }
            ClassificationOutcome::Error(e) if e.is_rate_limited() => {
                state.backoff_pending = true;
                return Ok(report(Disposition::Skipped {
                    reason: SkipReason::RateLimited(e.to_string()),
                }));
            }
            ClassificationOutcome::Error(e) => {
                return Ok(report(Disposition::Skipped {
                    reason: SkipReason::OracleFailed(e.to_string()),
                }));
            }
            ClassificationOutcome::Path(path) => path.clone(),
            ClassificationOutcome::Review => FolderPath::review(&self.config.root),
        };
        debug!(stage = Stage::Normalized.as_str(), destination = %destination);

        if let Err(e) = self.ensure_folder(mailbox, state, &destination).await {
            if e.is_fatal() {
                return Err(Error::Transport(e.source_error().clone()));
            }
            return Ok(report(Disposition::Failed {
                stage: Stage::Normalized,
                reason: e.to_string(),
            }));
        }
        debug!(stage = Stage::FolderEnsured.as_str());

        match self
            .relocate(mailbox, uid, message.seen, &destination.render(&state.delimiter))
            .await
        {
            Ok(unread_flag_cleared) => Ok(report(Disposition::Moved {
                destination: destination.to_string(),
                unread_flag_cleared,
            })),
            Err(e) if e.is_fatal() => Err(Error::Transport(e.source_error().clone())),
            Err(e) => Ok(report(Disposition::Failed {
                stage: Stage::FolderEnsured,
                reason: e.to_string(),
            })),
        }
    }

    async fn classify(
        &self,
        state: &mut RunState,
        features: &MessageFeatures,
    ) -> ClassificationOutcome {
        let backoff = self.config.rate_limit_backoff;
        if std::mem::take(&mut state.backoff_pending) && !backoff.is_zero() {
            info!(?backoff, "Backing off after rate limit");
            tokio::time::sleep(backoff).await;
        }
        self.classifier.classify(features, &state.cache).await
    }

    /// Makes sure `path` and each of its ancestors below the root exist.
    ///
    /// Each level is looked up in the cache first, then on the server, and
    /// created only if both say it is missing. "Already exists" counts as
    /// success. Every level that is confirmed or created is recorded in the
    /// cache before the next level is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`FolderOpError::Ensure`] for the first level that could not
    /// be checked or created. Levels above it stay in place.
    pub async fn ensure_folder<M: Mailbox + ?Sized>(
        &self,
        mailbox: &mut M,
        state: &mut RunState,
        path: &FolderPath,
    ) -> std::result::Result<(), FolderOpError> {
        for level in path.lineage() {
            let short_form = level.short_form();
            if state.cache.contains(&short_form) {
                continue;
            }

            let name = level.render(&state.delimiter);
            let ensure_err = |source| FolderOpError::Ensure {
                path: name.clone(),
                source,
            };

            if mailbox.folder_exists(&name).await.map_err(ensure_err)? {
                debug!(folder = %name, "Folder already on server");
            } else {
                match mailbox.create_folder(&name).await {
                    Ok(()) => {
                        info!(folder = %name, "Created folder");
                        state.created.push(name.clone());
                    }
                    Err(MailboxError::AlreadyExists(_)) => {
                        debug!(folder = %name, "Folder appeared concurrently");
                    }
                    Err(e) => return Err(ensure_err(e)),
                }
            }
            state.cache.record(short_form);
        }
        Ok(())
    }

    /// Clears the seen flag and moves the message.
    ///
    /// Returns whether the flag was cleared. A failed flag change is logged
    /// and does not stop the move. If the move fails, a cleared flag is put
    /// back when the message had been read.
    async fn relocate<M: Mailbox + ?Sized>(
        &self,
        mailbox: &mut M,
        uid: Uid,
        was_seen: bool,
        destination: &str,
    ) -> std::result::Result<bool, FolderOpError> {
        let move_err = |source| FolderOpError::Move {
            path: destination.to_string(),
            source,
        };

        let cleared = match mailbox.clear_flag(uid, Flag::Seen).await {
            Ok(()) => true,
            Err(e) if e.is_fatal() => return Err(move_err(e)),
            Err(e) => {
                warn!(error = %e, "Could not mark message unread, moving anyway");
                false
            }
        };

        if let Err(e) = mailbox.move_messages(&[uid], destination).await {
            if cleared && was_seen && !e.is_fatal() {
                if let Err(restore) = mailbox.add_flag(uid, Flag::Seen).await {
                    warn!(error = %restore, "Could not restore seen flag");
                }
            }
            return Err(move_err(e));
        }

        Ok(cleared)
    }
}

fn log_outcome(disposition: &Disposition) {
    match disposition {
        Disposition::Moved { destination, .. } => info!(%destination, "Moved"),
        Disposition::Skipped {
            reason: reason @ SkipReason::RateLimited(_),
        } => warn!(%reason, "Rate limited, leaving message in place"),
        Disposition::Skipped {
            reason: reason @ SkipReason::Classifier,
        } => info!(%reason, "Skipped"),
        Disposition::Skipped { reason } => warn!(%reason, "Skipped"),
        Disposition::Failed { stage, reason } => {
            warn!(stage = stage.as_str(), %reason, "Left in place after failure");
        }
    }
}
