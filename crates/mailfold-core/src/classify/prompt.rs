//! Classifier prompt construction.

use std::fmt::Write;

use super::SKIP_SENTINEL;
use crate::extract::MessageFeatures;
use crate::folder::{FolderCache, REVIEW_SEGMENT};

const KNOWN_FOLDER_LIMIT: usize = 200;

/// Builds the classification request for one message.
///
/// The known-folder list lets the oracle reuse existing branches instead of
/// inventing near-duplicates.
#[must_use]
pub fn build_prompt(features: &MessageFeatures, known: &FolderCache, root: &str) -> String {
    let mut prompt = String::with_capacity(1024 + features.snippet.len());

    prompt.push_str(
        "You are an email sorter. File the email below into a folder hierarchy.\n\
         \n\
         Answer with a single folder path using '/' between levels, \
         for example Finances/Invoices/Acme.\n\
         \n\
         RULES:\n\
         - Prefer an existing folder from the list below when one fits.\n\
         - Use one to three levels, each level one to three words.\n\
         - Use only letters, digits, spaces, hyphens and underscores in folder names.\n\
         - Finances/Invoices for receipts, bills and tax documents.\n\
         - Newsletters for marketing, bulk mail and subscriptions.\n\
         - Personal for direct mail from people.\n\
         - Work for professional or job-related mail.\n\
         - Travel for bookings and itineraries.\n",
    );
    let _ = writeln!(
        prompt,
        "- Answer {REVIEW_SEGMENT} if the email needs a human decision \
         and no folder clearly fits."
    );
    let _ = writeln!(
        prompt,
        "- Answer {SKIP_SENTINEL} for system notifications or anything that \
         should stay where it is."
    );

    prompt.push_str("\nEXISTING FOLDERS:\n");
    if known.is_empty() {
        prompt.push_str("(none yet)\n");
    } else {
        for path in known.iter().take(KNOWN_FOLDER_LIMIT) {
            let _ = writeln!(prompt, "- {path}");
        }
    }

    let _ = write!(
        prompt,
        "\nEmail Subject: {}\nFrom: {}\nContent Snippet: {}\n\n\
         Return ONLY the folder path, {REVIEW_SEGMENT} or {SKIP_SENTINEL}. \
         Do not prefix it with {root} and do not include any other text.\n",
        features.subject, features.sender, features.snippet
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> MessageFeatures {
        MessageFeatures {
            subject: "Flight confirmation".to_string(),
            sender: "Airline <noreply@air.example>".to_string(),
            snippet: "Your booking ABC123 is confirmed.".to_string(),
        }
    }

    #[test]
    fn test_prompt_includes_features() {
        let prompt = build_prompt(&features(), &FolderCache::new(), "Folders");
        assert!(prompt.contains("Email Subject: Flight confirmation"));
        assert!(prompt.contains("From: Airline <noreply@air.example>"));
        assert!(prompt.contains("Content Snippet: Your booking ABC123 is confirmed."));
        assert!(prompt.contains("(none yet)"));
    }

    #[test]
    fn test_prompt_lists_known_folders_in_order() {
        let mut cache = FolderCache::new();
        cache.record("Travel");
        cache.record("Finances/Invoices");

        let prompt = build_prompt(&features(), &cache, "Folders");
        let invoices = prompt.find("- Finances/Invoices\n").unwrap_or(usize::MAX);
        let travel = prompt.find("- Travel\n").unwrap_or(usize::MAX);
        assert!(invoices < travel);
        assert!(!prompt.contains("(none yet)"));
    }

    #[test]
    fn test_prompt_names_sentinels() {
        let prompt = build_prompt(&features(), &FolderCache::new(), "Folders");
        assert!(prompt.contains("Answer Review"));
        assert!(prompt.contains("Answer SKIP"));
    }
}
