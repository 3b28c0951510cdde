//! Run-scoped mirror of the managed folder hierarchy.

use std::collections::BTreeSet;

use super::{FolderEntry, delimiter_of, managed_short_form};

/// Short-form paths believed to exist below the managed root.
///
/// The cache is a hint, never the truth: it is rebuilt from a live listing
/// at the start of every run and only grows during the run. A path is
/// recorded only after the mailbox confirmed it exists or accepted its
/// creation.
#[derive(Debug, Clone, Default)]
pub struct FolderCache {
    known: BTreeSet<String>,
}

impl FolderCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache from a folder listing, keeping folders below `root`.
    ///
    /// Returns the cache and the hierarchy delimiter used by the listing.
    #[must_use]
    pub fn from_listing(entries: &[FolderEntry], root: &str) -> (Self, String) {
        let delimiter = delimiter_of(entries);
        let mut cache = Self::new();
        cache.seed(
            entries
                .iter()
                .filter_map(|e| managed_short_form(&e.name, &delimiter, root)),
        );
        (cache, delimiter)
    }

    /// Adds every path in `paths`.
    pub fn seed<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known.extend(paths.into_iter().map(Into::into));
    }

    /// Whether `short_form` is believed to exist.
    #[must_use]
    pub fn contains(&self, short_form: &str) -> bool {
        self.known.contains(short_form)
    }

    /// Records `short_form` as existing. Returns `true` if it was new.
    pub fn record(&mut self, short_form: impl Into<String>) -> bool {
        self.known.insert(short_form.into())
    }

    /// Known paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    /// Number of known paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no path is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
