//! Error types shared by the relocation engine.
//!
//! Every failure the engine can hit is reported to the immediate caller as one
//! of these variants. Nothing is logged-and-swallowed inside the core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while hashing, planning, moving or rolling back files.
#[derive(Debug, Error)]
pub enum RelocationError {
    /// A file could not be opened or read for hashing.
    #[error("Cannot read content of {path}: {source}")]
    ContentUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A planned destination already exists, or two plan entries share one.
    #[error("Destination collision: {path} is already taken")]
    DestinationCollision { path: PathBuf },

    /// The move itself failed after its journal entry was written.
    #[error("Failed to move {source_path} to {destination}: {error}")]
    MoveFailed {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// A journal line could not be parsed.
    #[error("Malformed record at {journal}:{line}: {reason} (content: {content})")]
    MalformedJournalRecord {
        journal: PathBuf,
        line: usize,
        content: String,
        reason: String,
    },

    /// A destination's current content no longer matches the journaled digest.
    #[error(
        "Integrity mismatch for journal entry {entry} ({destination}): expected {expected}, found {actual}"
    )]
    IntegrityMismatch {
        /// 1-based line number of the entry inside the journal.
        entry: usize,
        destination: PathBuf,
        expected: String,
        actual: String,
    },

    /// The restore target is occupied and the occupant could not be moved aside.
    #[error("Restore target {path} is occupied and could not be quarantined to {quarantine}: {error}")]
    OccupiedSource {
        path: PathBuf,
        quarantine: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The move plan violates a structural rule.
    #[error("Invalid move plan: {reason}")]
    InvalidPlan { reason: String },

    /// A naming pattern could not be parsed.
    #[error("Invalid naming pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failed to create a destination directory.
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or append to a journal file.
    #[error("Failed to write journal {path}: {source}")]
    JournalWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open or read a journal file.
    #[error("Failed to read journal {path}: {source}")]
    JournalReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to delete a duplicate copy.
    #[error("Failed to delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata lookup or directory listing failed.
    #[error("File system error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RelocationError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ContentUnreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Whether the error happened before any file was touched.
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            Self::DestinationCollision { .. } | Self::InvalidPlan { .. }
        )
    }
}

/// Result type for relocation engine operations.
pub type RelocationResult<T> = Result<T, RelocationError>;
