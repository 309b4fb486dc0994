/// Bounded undo history.
///
/// Successful sorts push their [`OperationRecord`] here; undo pops the most
/// recent one and moves every file back, last move first. The stack keeps at
/// most [`HISTORY_CAPACITY`] records and silently forgets the oldest.
use crate::error::{FileError, FileErrorKind, SortError, SortResult};
use crate::mover::{OperationRecord, ensure_dir, is_occupied, relocate};
use crate::progress::{OperationContext, Phase};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// How many sort operations stay undoable.
pub const HISTORY_CAPACITY: usize = 10;

/// File name used when history is persisted inside a sorted root.
pub const HISTORY_FILE_NAME: &str = ".filesorter_history.json";

/// Represents the result of an undo operation.
#[derive(Debug, Clone)]
pub struct UndoReport {
    /// The record that was undone.
    pub record: OperationRecord,
    /// Number of files moved back to their original location.
    pub moved_back: usize,
    /// Files that could not be restored.
    pub errors: Vec<FileError>,
    /// True when the undo stopped early on a cancel request.
    pub cancelled: bool,
}

impl UndoReport {
    /// Returns true if every recorded move was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Stack of undoable sort operations, newest last.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<OperationRecord>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history holding at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes a record, evicting the oldest one past capacity.
    ///
    /// Records without moves are ignored. Returns whether the record was kept.
    pub fn record(&mut self, record: OperationRecord) -> bool {
        if record.is_empty() {
            return false;
        }
        self.entries.push_back(record);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                log::debug!(
                    "history full, dropping sort of {} from {}",
                    evicted.root.display(),
                    evicted.timestamp
                );
            }
        }
        true
    }

    /// Most recent record, if any.
    pub fn last(&self) -> Option<&OperationRecord> {
        self.entries.back()
    }

    pub fn pop(&mut self) -> Option<OperationRecord> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &OperationRecord> {
        self.entries.iter()
    }

    /// Pops the most recent record and moves its files back.
    ///
    /// Moves are reversed last-first, each on its own: a failed restore is
    /// reported and the rest still run. Folders the sort created are removed
    /// afterwards if they ended up empty. Nothing checks that the file found
    /// at a recorded destination is still the one that was moved there.
    ///
    /// A cancelled undo pushes the moves it did not reach back onto the stack,
    /// so a later undo picks up where this one stopped.
    pub fn undo(&mut self, ctx: &OperationContext) -> SortResult<UndoReport> {
        let record = self.pop().ok_or(SortError::NoHistory)?;
        let (report, unfinished) = replay_backwards(record, ctx);
        if let Some(unfinished) = unfinished {
            self.record(unfinished);
        }
        Ok(report)
    }

    /// Writes the stack to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> SortResult<()> {
        let records: Vec<&OperationRecord> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&records).map_err(|e| SortError::HistoryWrite {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("JSON serialization failed: {}", e),
            ),
        })?;

        fs::write(path, json).map_err(|e| SortError::HistoryWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads a stack saved by [`save`](Self::save). A missing file is an
    /// empty history; extra records beyond capacity drop the oldest.
    pub fn load(path: &Path) -> SortResult<Self> {
        let mut history = Self::new();
        if !path.exists() {
            return Ok(history);
        }

        let json = fs::read_to_string(path).map_err(|e| SortError::HistoryRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let records: Vec<OperationRecord> =
            serde_json::from_str(&json).map_err(|e| SortError::InvalidHistoryFormat {
                reason: format!("JSON parse error: {}", e),
            })?;

        for record in records {
            history.record(record);
        }
        Ok(history)
    }

    /// Location of the history file for a root directory.
    pub fn default_path(root: &Path) -> PathBuf {
        root.join(HISTORY_FILE_NAME)
    }
}

/// Moves the files of `record` back, last move first.
///
/// Returns the report and, when cancelled, a record holding only the moves
/// that were not reached.
pub(crate) fn replay_backwards(
    record: OperationRecord,
    ctx: &OperationContext,
) -> (UndoReport, Option<OperationRecord>) {
    let total = record.moves.len();
    let mut moved_back = 0;
    let mut errors = Vec::new();
    let mut cancelled = false;
    let mut attempted = 0;

    for (index, step) in record.moves.iter().rev().enumerate() {
        if ctx.is_cancelled() {
            log::info!(
                "undo of {} cancelled after {} of {} restores",
                record.root.display(),
                moved_back,
                total
            );
            cancelled = true;
            break;
        }

        match restore(&step.to, &step.from) {
            Ok(()) => {
                log::info!("restored {} -> {}", step.to.display(), step.from.display());
                moved_back += 1;
            }
            Err(err) => {
                log::warn!("{}", err);
                ctx.file_error(&err);
                errors.push(err);
            }
        }
        attempted += 1;
        ctx.progress(Phase::Undoing, index + 1, Some(total));
    }

    for folder in record.created_folders.iter().rev() {
        // Only succeeds when the folder is empty again.
        if fs::remove_dir(folder).is_ok() {
            log::info!("removed folder {}", folder.display());
        }
    }

    ctx.progress(Phase::Undoing, moved_back, Some(total));

    let unfinished = cancelled.then(|| OperationRecord {
        moves: record.moves[..total - attempted].to_vec(),
        ..record.clone()
    });
    let report = UndoReport {
        record,
        moved_back,
        errors,
        cancelled,
    };
    (report, unfinished.filter(|r| !r.is_empty()))
}

fn restore(current: &Path, original: &Path) -> Result<(), FileError> {
    let fail = |path: &Path, message: String| FileError::new(path, FileErrorKind::Restore, message);

    if !is_occupied(current) {
        return Err(fail(current, "file not found at sorted location".to_string()));
    }
    if let Some(parent) = original.parent() {
        ensure_dir(parent).map_err(|e| fail(parent, format!("cannot recreate folder: {}", e)))?;
    }
    relocate(current, original)
        .map_err(|e| fail(current, format!("back to {}: {}", original.display(), e)))
}
