//! The entry point callers use: scan, preview, sort, undo, configure.
//!
//! A [`Session`] owns the extension table, the file filters and the undo
//! history. All methods take `&self`, so one session can be shared behind an
//! `Arc` and driven from background threads. Operations on the same root
//! directory never overlap: a second request while one is in flight fails
//! fast with [`SortError::OperationInProgress`].

use crate::classifier::ExtensionTable;
use crate::config::{CompiledFilters, ConfigError, SorterConfig};
use crate::error::{FileError, SortError, SortResult};
use crate::history::{History, UndoReport, replay_backwards};
use crate::mover::Mover;
use crate::planner::{PlannedMove, Planner};
use crate::progress::{OperationContext, Phase};
use crate::scanner::{ScanReport, Scanner, open_root};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Knobs for one sort pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    /// Plan only; touch nothing.
    pub preview_mode: bool,
    /// Create missing category folders before moving.
    pub create_folders: bool,
    /// Move unmatched files into an `Other` folder instead of leaving them.
    pub include_other: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            preview_mode: false,
            create_folders: true,
            include_other: true,
        }
    }
}

/// Outcome of a sort (or of a preview, when `preview` is set).
#[derive(Debug, Clone)]
pub struct SortReport {
    pub root: PathBuf,
    /// Files actually moved.
    pub moved: usize,
    /// Files already in their category folder.
    pub skipped_already_correct: usize,
    /// Unmatched files left in place.
    pub skipped_unmatched: usize,
    /// Per-file problems from scanning, planning and moving.
    pub errors: Vec<FileError>,
    /// The plan that was executed (or would be, in preview mode).
    pub planned: Vec<PlannedMove>,
    pub preview: bool,
    pub cancelled: bool,
    /// Whether the sort was pushed onto the undo history.
    pub recorded: bool,
}

impl SortReport {
    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Shared state for every operation a caller runs.
#[derive(Debug)]
pub struct Session {
    table: RwLock<Arc<ExtensionTable>>,
    filters: RwLock<Arc<CompiledFilters>>,
    history: Mutex<History>,
    active: Mutex<HashMap<PathBuf, Phase>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ExtensionTable::default(), CompiledFilters::default())
    }
}

impl Session {
    pub fn new(table: ExtensionTable, filters: CompiledFilters) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            filters: RwLock::new(Arc::new(filters)),
            history: Mutex::new(History::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a session from a loaded configuration file.
    pub fn from_config(config: &SorterConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.extension_table(), config.compile_filters()?))
    }

    /// Replaces the extension table used by later operations.
    pub fn configure(&self, table: ExtensionTable) {
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    pub fn configure_filters(&self, filters: CompiledFilters) {
        *self.filters.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(filters);
    }

    pub fn extension_table(&self) -> Arc<ExtensionTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn filters(&self) -> Arc<CompiledFilters> {
        Arc::clone(&self.filters.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of undoable sorts.
    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    /// Replaces the undo history, e.g. with one loaded from disk.
    pub fn set_history(&self, history: History) {
        *self.history() = history;
    }

    /// A copy of the undo history, e.g. for saving to disk.
    pub fn history_snapshot(&self) -> History {
        self.history().clone()
    }

    /// Phase of the operation currently running on `dir`, if any.
    pub fn phase_of(&self, dir: &Path) -> Option<Phase> {
        let root = std::fs::canonicalize(dir).ok()?;
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&root)
            .copied()
    }

    /// Claims `root` for one operation, failing if it, an ancestor or a
    /// descendant is already busy.
    fn acquire(&self, root: &Path, phase: Phase) -> SortResult<RootGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(busy) = active
            .keys()
            .find(|busy| root.starts_with(busy) || busy.starts_with(root))
        {
            return Err(SortError::OperationInProgress(busy.clone()));
        }
        active.insert(root.to_path_buf(), phase);
        Ok(RootGuard {
            active: &self.active,
            root: root.to_path_buf(),
        })
    }

    pub fn scan(&self, dir: &Path) -> SortResult<ScanReport> {
        self.scan_with(dir, &OperationContext::new())
    }

    /// Classifies everything under `dir` without planning or moving.
    pub fn scan_with(&self, dir: &Path, ctx: &OperationContext) -> SortResult<ScanReport> {
        let root = open_root(dir)?;
        let _guard = self.acquire(&root, Phase::Scanning)?;
        self.scan_root(&root, ctx)
    }

    fn scan_root(&self, root: &Path, ctx: &OperationContext) -> SortResult<ScanReport> {
        let table = self.extension_table();
        let filters = self.filters();
        Scanner::new(&table).with_filters(&filters).scan(root, ctx)
    }

    /// Human-readable summary of what a sort of `dir` would do.
    pub fn preview(&self, dir: &Path) -> SortResult<String> {
        let options = SortOptions {
            preview_mode: true,
            ..SortOptions::default()
        };
        let report = self.sort(dir, options)?;
        Ok(render_preview(&report))
    }

    pub fn sort(&self, dir: &Path, options: SortOptions) -> SortResult<SortReport> {
        self.sort_with(dir, options, &OperationContext::new())
    }

    /// Scans, plans and (unless previewing) moves, then records the moves for
    /// undo. Fails before touching anything if the root is unusable, busy or
    /// the scan is cancelled.
    pub fn sort_with(
        &self,
        dir: &Path,
        options: SortOptions,
        ctx: &OperationContext,
    ) -> SortResult<SortReport> {
        let root = open_root(dir)?;
        let guard = self.acquire(&root, Phase::Scanning)?;

        let scan = self.scan_root(&root, ctx)?;
        let mut errors = scan.errors;

        guard.set_phase(Phase::Planning);
        let plan = Planner::new()
            .include_other(options.include_other)
            .plan(&scan.inventory, &root);
        errors.extend(plan.errors.iter().cloned());
        log::debug!(
            "planned {} moves under {} ({} already sorted)",
            plan.len(),
            root.display(),
            plan.already_correct
        );

        let mut report = SortReport {
            root: root.clone(),
            moved: 0,
            skipped_already_correct: plan.already_correct,
            skipped_unmatched: plan.left_unmatched,
            errors,
            planned: plan.moves.clone(),
            preview: options.preview_mode,
            cancelled: false,
            recorded: false,
        };
        if options.preview_mode {
            return Ok(report);
        }

        guard.set_phase(Phase::Moving);
        let applied = Mover::new(options.create_folders).apply(&plan, &root, ctx);
        report.moved = applied.moved;
        report.cancelled = applied.cancelled;
        report.errors.extend(applied.errors);
        report.recorded = self.history().record(applied.record);
        Ok(report)
    }

    pub fn undo(&self) -> SortResult<UndoReport> {
        self.undo_with(&OperationContext::new())
    }

    /// Reverses the most recent recorded sort.
    ///
    /// The record is taken off the stack before any file moves, so the
    /// observer may call back into the session. If the undo is cancelled, the
    /// moves it did not reach go back on the stack.
    pub fn undo_with(&self, ctx: &OperationContext) -> SortResult<UndoReport> {
        let (record, _guard) = {
            let mut history = self.history();
            let root = history.last().ok_or(SortError::NoHistory)?.root.clone();
            let guard = self.acquire(&root, Phase::Undoing)?;
            let record = history.pop().ok_or(SortError::NoHistory)?;
            (record, guard)
        };

        let (report, unfinished) = replay_backwards(record, ctx);
        if let Some(unfinished) = unfinished {
            self.history().record(unfinished);
        }
        Ok(report)
    }

    /// Runs [`sort_with`](Self::sort_with) on a background thread.
    pub fn spawn_sort(
        self: &Arc<Self>,
        dir: PathBuf,
        options: SortOptions,
        ctx: OperationContext,
    ) -> JoinHandle<SortResult<SortReport>> {
        let session = Arc::clone(self);
        thread::spawn(move || session.sort_with(&dir, options, &ctx))
    }

    /// Runs [`undo_with`](Self::undo_with) on a background thread.
    pub fn spawn_undo(self: &Arc<Self>, ctx: OperationContext) -> JoinHandle<SortResult<UndoReport>> {
        let session = Arc::clone(self);
        thread::spawn(move || session.undo_with(&ctx))
    }
}

/// Releases a root claimed by [`Session::acquire`] when dropped.
struct RootGuard<'a> {
    active: &'a Mutex<HashMap<PathBuf, Phase>>,
    root: PathBuf,
}

impl RootGuard<'_> {
    fn set_phase(&self, phase: Phase) {
        if let Some(current) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&self.root)
        {
            *current = phase;
        }
    }
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.root);
    }
}

fn render_preview(report: &SortReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Preview of {}", report.root.display());

    let mut counts: Vec<(&str, usize)> = Vec::new();
    for planned in &report.planned {
        match counts.iter_mut().find(|(c, _)| *c == planned.category) {
            Some((_, n)) => *n += 1,
            None => counts.push((planned.category.as_str(), 1)),
        }
    }
    for (category, count) in &counts {
        let noun = if *count == 1 { "file" } else { "files" };
        let _ = writeln!(out, "  {}: {} {}", category, count, noun);
    }

    for planned in &report.planned {
        let from = planned
            .source
            .strip_prefix(&report.root)
            .unwrap_or(&planned.source);
        let to = planned
            .destination
            .strip_prefix(&report.root)
            .unwrap_or(&planned.destination);
        let _ = writeln!(out, "  {} -> {}", from.display(), to.display());
    }

    let _ = writeln!(
        out,
        "{} to move, {} already sorted, {} errors",
        report.planned.len(),
        report.skipped_already_correct,
        report.errors.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, rel).expect("Failed to write file");
    }

    #[test]
    fn test_sort_records_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        let session = Session::default();

        let report = session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");
        assert_eq!(report.moved, 1);
        assert!(report.recorded);
        assert_eq!(session.history_len(), 1);
    }

    #[test]
    fn test_sort_with_nothing_to_move_records_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "Pdfs/a.pdf");
        let session = Session::default();

        let report = session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");
        assert_eq!(report.moved, 0);
        assert_eq!(report.skipped_already_correct, 1);
        assert!(!report.recorded);
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_busy_root_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        let session = Session::default();
        let root = open_root(temp_dir.path()).unwrap();

        let guard = session.acquire(&root, Phase::Moving).unwrap();
        assert_eq!(session.phase_of(temp_dir.path()), Some(Phase::Moving));

        let result = session.sort(temp_dir.path(), SortOptions::default());
        assert!(matches!(result, Err(SortError::OperationInProgress(_))));
        assert!(matches!(
            session.scan(temp_dir.path()),
            Err(SortError::OperationInProgress(_))
        ));
        assert!(temp_dir.path().join("a.pdf").exists());

        drop(guard);
        assert_eq!(session.phase_of(temp_dir.path()), None);
        assert!(session.sort(temp_dir.path(), SortOptions::default()).is_ok());
    }

    #[test]
    fn test_undo_rejected_while_root_busy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        let session = Session::default();
        session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");

        let root = open_root(temp_dir.path()).unwrap();
        let guard = session.acquire(&root, Phase::Scanning).unwrap();
        assert!(matches!(
            session.undo(),
            Err(SortError::OperationInProgress(_))
        ));
        assert_eq!(session.history_len(), 1);
        drop(guard);

        session.undo().expect("undo failed");
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_nested_roots_are_rejected_while_busy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "inner/a.pdf");
        touch(temp_dir.path(), "b.pdf");
        let session = Session::default();
        let inner = open_root(&temp_dir.path().join("inner")).unwrap();

        let guard = session.acquire(&inner, Phase::Moving).unwrap();
        assert!(matches!(
            session.sort(temp_dir.path(), SortOptions::default()),
            Err(SortError::OperationInProgress(_))
        ));
        drop(guard);

        let outer = open_root(temp_dir.path()).unwrap();
        let guard = session.acquire(&outer, Phase::Moving).unwrap();
        assert!(matches!(
            session.sort(&inner, SortOptions::default()),
            Err(SortError::OperationInProgress(_))
        ));
        drop(guard);

        assert!(temp_dir.path().join("b.pdf").exists());
        assert!(temp_dir.path().join("inner/a.pdf").exists());
    }

    #[test]
    fn test_observer_can_query_session_during_undo() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        touch(temp_dir.path(), "b.pdf");
        let session = Arc::new(Session::default());
        session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let watched = Arc::clone(&session);
        let ctx = OperationContext::new().with_observer(move |_: &ProgressEvent| {
            sink.lock().unwrap().push(watched.history_len());
        });

        let report = session.undo_with(&ctx).expect("undo failed");
        assert_eq!(report.moved_back, 2);
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|len| *len == 0));
    }

    #[test]
    fn test_cancelled_undo_can_be_resumed() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            touch(temp_dir.path(), name);
        }
        let session = Session::default();
        session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");

        let ctx = OperationContext::new();
        let token = ctx.cancel_token().clone();
        let ctx = ctx.with_observer(move |e: &ProgressEvent| {
            if let ProgressEvent::Progress { processed: 1, .. } = e {
                token.cancel();
            }
        });
        let report = session.undo_with(&ctx).expect("undo failed");
        assert!(report.cancelled);
        assert_eq!(report.moved_back, 1);
        assert_eq!(session.history_len(), 1);

        let report = session.undo().expect("second undo failed");
        assert_eq!(report.moved_back, 2);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            assert!(temp_dir.path().join(name).exists());
        }
        assert!(!temp_dir.path().join("Pdfs").exists());
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_guard_released_after_failed_scan() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let session = Session::default();
        let ctx = OperationContext::new();
        ctx.cancel_token().cancel();

        let result = session.sort_with(temp_dir.path(), SortOptions::default(), &ctx);
        assert!(matches!(result, Err(SortError::Cancelled)));
        assert_eq!(session.phase_of(temp_dir.path()), None);
    }

    #[test]
    fn test_configure_changes_classification() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "book.epub");
        let session = Session::default();
        session.configure(ExtensionTable::empty().with_category("Books", [".epub"]));

        session
            .sort(temp_dir.path(), SortOptions::default())
            .expect("sort failed");
        assert!(temp_dir.path().join("Books/book.epub").exists());
    }

    #[test]
    fn test_preview_text() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        touch(temp_dir.path(), "b.pdf");
        touch(temp_dir.path(), "c.mp3");
        let session = Session::default();

        let text = session.preview(temp_dir.path()).expect("preview failed");
        assert!(text.contains("Pdfs: 2 files"));
        assert!(text.contains("Music: 1 file"));
        assert!(text.contains("a.pdf -> Pdfs/a.pdf"));
        assert!(text.contains("3 to move, 0 already sorted, 0 errors"));
        assert!(temp_dir.path().join("a.pdf").exists());
        assert_eq!(session.history_len(), 0);
    }

    #[test]
    fn test_spawned_sort_and_undo() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        touch(temp_dir.path(), "a.pdf");
        let session = Arc::new(Session::default());

        let report = session
            .spawn_sort(
                temp_dir.path().to_path_buf(),
                SortOptions::default(),
                OperationContext::new(),
            )
            .join()
            .expect("sort thread panicked")
            .expect("sort failed");
        assert_eq!(report.moved, 1);

        let undo = session
            .spawn_undo(OperationContext::new())
            .join()
            .expect("undo thread panicked")
            .expect("undo failed");
        assert_eq!(undo.moved_back, 1);
        assert!(temp_dir.path().join("a.pdf").exists());
    }
}
