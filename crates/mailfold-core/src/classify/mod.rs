//! Classification adapter.
//!
//! The oracle is an untrusted function returning free text. This module
//! builds the request from message features and the known-folder cache,
//! then maps whatever comes back onto a [`ClassificationOutcome`]:
//!
//! - `SKIP` → [`ClassificationOutcome::Skip`]
//! - `REVIEW` / `NEEDS REVIEW` → [`ClassificationOutcome::Review`]
//! - anything else → sanitized and normalized into a [`FolderPath`]
//! - oracle failures → [`ClassificationOutcome::Error`]
//!
//! # Example
//!
//! ```ignore
//! let classifier = Classifier::new(GeminiOracle::new(config)?, "Folders");
//! match classifier.classify(&features, &cache).await {
//!     ClassificationOutcome::Path(path) => println!("file under {path}"),
//!     ClassificationOutcome::Review => println!("needs review"),
//!     ClassificationOutcome::Skip => println!("leave it"),
//!     ClassificationOutcome::Error(e) => println!("oracle failed: {e}"),
//! }
//! ```

mod gemini;
mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

pub use gemini::{GeminiOracle, ModelInfo};
pub use prompt::build_prompt;

use crate::extract::MessageFeatures;
use crate::folder::{self, FolderCache, FolderPath};

/// Sentinel asking the engine to leave the message alone.
pub const SKIP_SENTINEL: &str = "SKIP";

/// Sentinels routing the message to the review folder.
pub const REVIEW_SENTINELS: [&str; 4] = ["REVIEW", "NEEDS REVIEW", "NEEDS_REVIEW", "NEEDS-REVIEW"];

/// Failure of a single oracle call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The provider signalled rate limiting.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The call did not complete in time.
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the response not received.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider does not know the requested model.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// The provider answered with an error status.
    #[error("Oracle returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The response carried no text.
    #[error("Oracle returned no text")]
    EmptyResponse,

    /// The response body could not be decoded.
    #[error("Invalid oracle response: {0}")]
    Decode(String),
}

impl OracleError {
    /// Whether this failure is a rate-limit signal.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// A text-completion service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Sends `prompt` and returns the raw answer text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    /// File the message under this folder.
    Path(FolderPath),
    /// File the message under the reserved review folder.
    Review,
    /// Leave the message where it is.
    Skip,
    /// The oracle failed; leave the message where it is.
    Error(OracleError),
}

impl ClassificationOutcome {
    /// Destination folder, if the outcome implies a move.
    #[must_use]
    pub fn destination(&self, root: &str) -> Option<FolderPath> {
        match self {
            Self::Path(path) => Some(path.clone()),
            Self::Review => Some(FolderPath::review(root)),
            Self::Skip | Self::Error(_) => None,
        }
    }
}

/// Maps message features to a [`ClassificationOutcome`] using an [`Oracle`].
#[derive(Debug)]
pub struct Classifier<O> {
    oracle: O,
    root: String,
}

impl<O: Oracle> Classifier<O> {
    /// Creates a classifier filing under `root`.
    pub fn new(oracle: O, root: impl Into<String>) -> Self {
        Self {
            oracle,
            root: root.into(),
        }
    }

    /// The wrapped oracle.
    pub const fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Issues exactly one oracle call and interprets the answer.
    pub async fn classify(
        &self,
        features: &MessageFeatures,
        known: &FolderCache,
    ) -> ClassificationOutcome {
        let prompt = build_prompt(features, known, &self.root);
        match self.oracle.complete(&prompt).await {
            Ok(answer) => {
                debug!(answer = %answer.trim(), "Oracle answered");
                parse_response(&answer, &self.root)
            }
            Err(e) => ClassificationOutcome::Error(e),
        }
    }
}

/// Interprets raw oracle text.
///
/// Only the first non-empty line is considered. Surrounding whitespace and
/// quote characters are trimmed before sentinel matching; characters
/// outside the allow-set are then stripped and the remainder normalized
/// below `root`. Fewer than two meaningful characters, or nothing left
/// below the root, count as a skip.
#[must_use]
pub fn parse_response(text: &str, root: &str) -> ClassificationOutcome {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let trimmed = line
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`'))
        .trim();

    if trimmed.eq_ignore_ascii_case(SKIP_SENTINEL) {
        return ClassificationOutcome::Skip;
    }
    if REVIEW_SENTINELS
        .iter()
        .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
    {
        return ClassificationOutcome::Review;
    }

    let cleaned = folder::sanitize(trimmed);
    if cleaned.trim().chars().count() < 2 {
        return ClassificationOutcome::Skip;
    }

    folder::normalize(&cleaned, root).map_or(ClassificationOutcome::Skip, ClassificationOutcome::Path)
}
