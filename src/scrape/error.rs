use std::path::PathBuf;
use thiserror::Error;

/// Extraction failures, split so callers can tell a retryable miss from a
/// filing whose structure needs manual inspection. Every variant ends the
/// current attempt only; none of them aborts the batch.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Two or more candidate files matched the same keyword. The system
    /// cannot safely guess which one carries the statement.
    #[error("{count} files matched keyword \"{keyword}\"; ambiguous filing structure")]
    AmbiguousFragments { keyword: String, count: usize },

    /// Neither the thousands-of-yen nor the millions-of-yen marker was found,
    /// so none of the extracted amounts could be scaled.
    #[error("could not identify the monetary unit of the statement table")]
    UnitNotFound,

    /// The share-count fragment contained no table at all.
    #[error("no table found in the share count fragment")]
    NoTable,

    /// The share-count table had no cell matching the issued-shares label or
    /// no usable total row.
    #[error("share count label keywords not found in table")]
    KeywordNotFound,

    #[error("failed to read markup from {path:?}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScrapeError {
    /// Structural errors point at a filing whose layout violates the
    /// one-fragment-per-keyword assumption; they are logged at error level
    /// and flagged for manual inspection rather than quietly retried.
    pub fn is_structural(&self) -> bool {
        matches!(self, ScrapeError::AmbiguousFragments { .. })
    }
}
