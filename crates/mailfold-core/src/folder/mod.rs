//! Engine-managed folder paths.
//!
//! Every folder the engine creates lives under a single root container
//! (`Folders` by default). [`normalize`] turns untrusted classifier text
//! into a canonical [`FolderPath`]; the mapping is pure so repeated runs
//! converge on the same folder instead of drifting between spellings.

mod cache;

use std::fmt;

pub use cache::FolderCache;

use crate::service::FolderEntry;

/// Segment of the reserved folder for messages that need a human look.
pub const REVIEW_SEGMENT: &str = "Review";

/// Delimiter assumed when the server does not report one.
pub const DEFAULT_DELIMITER: &str = "/";

/// A canonical folder path below the managed root.
///
/// Invariant: at least one segment; each segment is non-empty and made
/// of letters, digits, spaces, underscores and hyphens, with every
/// space-separated word capitalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderPath {
    root: String,
    segments: Vec<String>,
}

impl FolderPath {
    /// The reserved review folder, `<root>/Review`.
    #[must_use]
    pub fn review(root: &str) -> Self {
        Self {
            root: root.to_string(),
            segments: vec![REVIEW_SEGMENT.to_string()],
        }
    }

    /// Name of the root container.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Path segments below the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Segments joined with `/`, without the root. Used as the cache key and
    /// in the classifier's known-folder list.
    #[must_use]
    pub fn short_form(&self) -> String {
        self.segments.join("/")
    }

    /// Full mailbox name using the server's hierarchy delimiter.
    #[must_use]
    pub fn render(&self, delimiter: &str) -> String {
        let mut name = self.root.clone();
        for segment in &self.segments {
            name.push_str(delimiter);
            name.push_str(segment);
        }
        name
    }

    /// This path and each of its ancestors below the root, shallowest first.
    ///
    /// `Folders/A/B` yields `Folders/A` then `Folders/A/B`.
    pub fn lineage(&self) -> impl Iterator<Item = Self> + '_ {
        (1..=self.segments.len()).map(|len| Self {
            root: self.root.clone(),
            segments: self.segments[..len].to_vec(),
        })
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_DELIMITER))
    }
}

/// Characters allowed in raw classifier output.
///
/// Letters and digits from any script are kept; non-ASCII names are
/// encoded as modified UTF-7 on the wire.
#[must_use]
pub fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '/' | '_' | '-')
}

/// Drops every character outside the allow-set.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|&c| is_allowed(c)).collect()
}

/// Produces the canonical folder path for a slash-delimited string.
///
/// A leading segment equal to `root` (ignoring case) is treated as the
/// root itself. Remaining segments are split into words on spaces and
/// underscores, each word capitalized, and the words rejoined with single
/// spaces. Empty segments are dropped. Returns `None` when nothing is left
/// below the root.
#[must_use]
pub fn normalize(raw: &str, root: &str) -> Option<FolderPath> {
    let mut pieces = raw.split('/').map(canonical_segment).filter(|s| !s.is_empty()).peekable();

    if pieces.peek().is_some_and(|first| first.eq_ignore_ascii_case(root)) {
        pieces.next();
    }

    let segments: Vec<String> = pieces.collect();
    if segments.is_empty() {
        return None;
    }

    Some(FolderPath {
        root: root.to_string(),
        segments,
    })
}

fn canonical_segment(segment: &str) -> String {
    sanitize(segment)
        .split(|c: char| c == ' ' || c == '_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        std::iter::once(single_case(first, first.to_uppercase()))
            .chain(chars.map(|c| single_case(c, c.to_lowercase())))
            .collect()
    })
}

/// Applies a case mapping only when it yields exactly one character, so
/// `ß` stays `ß` instead of growing into `SS`.
fn single_case(original: char, mut mapped: impl Iterator<Item = char>) -> char {
    match (mapped.next(), mapped.next()) {
        (Some(c), None) => c,
        _ => original,
    }
}

/// Picks the hierarchy delimiter from a folder listing.
///
/// The first non-empty delimiter wins; [`DEFAULT_DELIMITER`] otherwise.
#[must_use]
pub fn delimiter_of(entries: &[FolderEntry]) -> String {
    entries
        .iter()
        .filter_map(|e| e.delimiter.as_deref())
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DELIMITER)
        .to_string()
}

/// Short form of a listed folder if it lives below `root`.
///
/// `Folders/Work/Feedback` with delimiter `/` yields `Work/Feedback`; the
/// root itself and folders outside it yield `None`.
#[must_use]
pub fn managed_short_form(name: &str, delimiter: &str, root: &str) -> Option<String> {
    let rest = name.strip_prefix(root)?.strip_prefix(delimiter)?;
    let segments: Vec<&str> = rest.split(delimiter).filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

/// Number of hierarchy levels in a mailbox name.
#[must_use]
pub fn depth_of(name: &str, delimiter: &str) -> usize {
    if delimiter.is_empty() {
        return 0;
    }
    name.matches(delimiter).count()
}
