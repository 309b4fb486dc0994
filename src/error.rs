//! Error types shared by every stage of a sort.
//!
//! Two tiers exist. [`SortError`] aborts a whole operation (bad root, empty
//! history, a concurrent operation on the same root). [`FileError`] describes
//! one file that could not be scanned, planned, moved or restored; those are
//! collected into reports and never abort a batch.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an operation before or instead of producing a report.
#[derive(Debug, Error)]
pub enum SortError {
    /// The root directory does not exist or cannot be read.
    #[error("cannot access directory {}: {source}", .path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Undo was requested with nothing on the history stack.
    #[error("no previous sort to undo")]
    NoHistory,
    /// Another scan, sort or undo is running against the same root.
    #[error("an operation is already in progress on {}", .0.display())]
    OperationInProgress(PathBuf),
    /// The operation was cancelled before any file was moved.
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed to read history file {}: {source}", .path.display())]
    HistoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write history file {}: {source}", .path.display())]
    HistoryWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid history file format: {reason}")]
    InvalidHistoryFormat { reason: String },
}

/// Result type for sort operations.
pub type SortResult<T> = Result<T, SortError>;

/// What went wrong with a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// The entry could not be read while walking the tree.
    Unreadable,
    /// A destination category folder could not be created.
    FolderCreation,
    /// Moving the file into its category folder failed.
    Move,
    /// Moving the file back during undo failed.
    Restore,
    /// No free `_N` name was found within the attempt cap.
    CollisionResolutionExhausted,
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unreadable => "unreadable",
            Self::FolderCreation => "folder creation failed",
            Self::Move => "move failed",
            Self::Restore => "restore failed",
            Self::CollisionResolutionExhausted => "no free name",
        };
        f.write_str(label)
    }
}

/// A per-file failure, isolated from the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {kind}: {message}", .path.display())]
pub struct FileError {
    /// The offending path (source for moves, destination for restores).
    pub path: PathBuf,
    pub kind: FileErrorKind,
    /// Human-readable reason, usually the underlying I/O error.
    pub message: String,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, kind: FileErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_error_display_includes_path_and_reason() {
        let err = FileError::new("/tmp/a.pdf", FileErrorKind::Move, "permission denied");
        let text = err.to_string();
        assert!(text.contains("/tmp/a.pdf"));
        assert!(text.contains("move failed"));
        assert!(text.contains("permission denied"));
    }

    #[test]
    fn test_directory_access_display() {
        let err = SortError::DirectoryAccess {
            path: PathBuf::from("/missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().starts_with("cannot access directory /missing"));
    }
}
