/// Executing a move plan.
///
/// This module creates category folders, relocates files and records every
/// move that actually happened in an [`OperationRecord`], which is what undo
/// later replays backwards. Each move is attempted on its own: one failure is
/// reported and the rest of the batch carries on.
use crate::error::{FileError, FileErrorKind};
use crate::planner::MovePlan;
use crate::progress::{OperationContext, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One performed relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Where the file was before the sort.
    pub from: PathBuf,
    /// Where the sort put it.
    pub to: PathBuf,
}

/// The as-performed log of one sort pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Utc>,
    /// Root directory the sort ran against.
    pub root: PathBuf,
    /// Successful moves, in the order performed.
    pub moves: Vec<MoveRecord>,
    /// Category folders this pass had to create.
    #[serde(default)]
    pub created_folders: Vec<PathBuf>,
}

impl OperationRecord {
    pub fn new(root: PathBuf) -> Self {
        Self {
            timestamp: Utc::now(),
            root,
            moves: Vec::new(),
            created_folders: Vec::new(),
        }
    }

    pub fn add_move(&mut self, from: PathBuf, to: PathBuf) {
        self.moves.push(MoveRecord { from, to });
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// What [`Mover::apply`] did.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub record: OperationRecord,
    pub moved: usize,
    pub errors: Vec<FileError>,
    /// True when the batch stopped early on a cancel request.
    pub cancelled: bool,
}

/// Carries out [`MovePlan`]s.
#[derive(Debug, Clone, Copy)]
pub struct Mover {
    create_folders: bool,
}

impl Mover {
    pub fn new(create_folders: bool) -> Self {
        Self { create_folders }
    }

    /// Performs every planned move in order.
    ///
    /// Folders are created up front when `create_folders` is set. Without it, a
    /// move into a missing folder fails like any other move. Cancellation is
    /// honoured between files; moves already made stay in the record.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use filesorter::classifier::ExtensionTable;
    /// use filesorter::mover::Mover;
    /// use filesorter::planner::plan;
    /// use filesorter::progress::OperationContext;
    /// use filesorter::scanner::scan;
    /// use std::path::Path;
    ///
    /// let inventory = scan(Path::new("/path/to/downloads"), &ExtensionTable::default())
    ///     .unwrap()
    ///     .inventory;
    /// let plan = plan(&inventory, inventory.root());
    /// let report = Mover::new(true).apply(&plan, inventory.root(), &OperationContext::new());
    /// println!("moved {} files", report.moved);
    /// ```
    pub fn apply(&self, plan: &MovePlan, root: &Path, ctx: &OperationContext) -> ApplyReport {
        let mut record = OperationRecord::new(root.to_path_buf());
        let mut errors = Vec::new();
        let total = plan.len();

        if self.create_folders {
            for folder in plan.destination_folders() {
                match ensure_dir(&folder) {
                    Ok(true) => {
                        log::info!("created folder {}", folder.display());
                        record.created_folders.push(folder);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        let err = FileError::new(&folder, FileErrorKind::FolderCreation, e.to_string());
                        log::warn!("{}", err);
                        ctx.file_error(&err);
                        errors.push(err);
                    }
                }
            }
        }

        let mut cancelled = false;
        for (index, planned) in plan.moves.iter().enumerate() {
            if ctx.is_cancelled() {
                log::info!(
                    "sort of {} cancelled after {} of {} moves",
                    root.display(),
                    record.moves.len(),
                    total
                );
                cancelled = true;
                break;
            }

            match relocate(&planned.source, &planned.destination) {
                Ok(()) => {
                    log::info!(
                        "moved {} -> {}",
                        planned.source.display(),
                        planned.destination.display()
                    );
                    record.add_move(planned.source.clone(), planned.destination.clone());
                }
                Err(e) => {
                    let err = FileError::new(
                        &planned.source,
                        FileErrorKind::Move,
                        format!("to {}: {}", planned.destination.display(), e),
                    );
                    log::warn!("{}", err);
                    ctx.file_error(&err);
                    errors.push(err);
                }
            }
            ctx.progress(Phase::Moving, index + 1, Some(total));
        }

        let moved = record.moves.len();
        ctx.progress(Phase::Moving, moved, Some(total));

        ApplyReport {
            record,
            moved,
            errors,
            cancelled,
        }
    }
}

/// Creates `dir` (and parents) if missing. Returns whether it was created.
pub(crate) fn ensure_dir(dir: &Path) -> io::Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether anything, including a dangling symlink, sits at `path`.
pub(crate) fn is_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Moves one file without ever overwriting.
///
/// A plain rename is tried first. Across filesystems the file is copied and
/// the original removed; if the removal fails the copy is deleted again so the
/// file exists in exactly one place.
pub(crate) fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    if is_occupied(to) {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination already exists",
        ));
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!(
                "rename across devices, copying {} -> {}",
                from.display(),
                to.display()
            );
            fs::copy(from, to)?;
            if let Err(remove_err) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(remove_err);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::PlannedMove;
    use crate::progress::ProgressEvent;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn planned(root: &Path, from: &str, to: &str) -> PlannedMove {
        PlannedMove {
            source: root.join(from),
            destination: root.join(to),
            category: to.split('/').next().unwrap_or_default().to_string(),
        }
    }

    fn plan_of(moves: Vec<PlannedMove>) -> MovePlan {
        MovePlan {
            moves,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_creates_folders_and_moves() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.pdf"), "pdf").expect("Failed to write file");
        fs::write(root.join("b.jpg"), "jpg").expect("Failed to write file");
        fs::create_dir(root.join("Pdfs")).expect("Failed to create dir");

        let plan = plan_of(vec![
            planned(root, "a.pdf", "Pdfs/a.pdf"),
            planned(root, "b.jpg", "Images/b.jpg"),
        ]);
        let report = Mover::new(true).apply(&plan, root, &OperationContext::new());

        assert_eq!(report.moved, 2);
        assert!(report.errors.is_empty());
        assert!(!report.cancelled);
        assert!(root.join("Pdfs/a.pdf").exists());
        assert!(root.join("Images/b.jpg").exists());
        assert_eq!(report.record.created_folders, vec![root.join("Images")]);
        assert_eq!(report.record.moves[0].from, root.join("a.pdf"));
        assert_eq!(report.record.moves[1].to, root.join("Images/b.jpg"));
    }

    #[test]
    fn test_apply_without_folder_creation_fails_per_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.pdf"), "pdf").expect("Failed to write file");
        fs::write(root.join("b.jpg"), "jpg").expect("Failed to write file");
        fs::create_dir(root.join("Images")).expect("Failed to create dir");

        let plan = plan_of(vec![
            planned(root, "a.pdf", "Pdfs/a.pdf"),
            planned(root, "b.jpg", "Images/b.jpg"),
        ]);
        let report = Mover::new(false).apply(&plan, root, &OperationContext::new());

        assert_eq!(report.moved, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, FileErrorKind::Move);
        assert!(root.join("a.pdf").exists());
        assert!(!root.join("Pdfs").exists());
    }

    #[test]
    fn test_apply_isolates_failures() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.pdf"), "a").expect("Failed to write file");
        fs::write(root.join("c.pdf"), "c").expect("Failed to write file");

        let plan = plan_of(vec![
            planned(root, "a.pdf", "Pdfs/a.pdf"),
            planned(root, "vanished.pdf", "Pdfs/vanished.pdf"),
            planned(root, "c.pdf", "Pdfs/c.pdf"),
        ]);
        let report = Mover::new(true).apply(&plan, root, &OperationContext::new());

        assert_eq!(report.moved, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, root.join("vanished.pdf"));
        let moved: Vec<_> = report.record.moves.iter().map(|m| m.to.clone()).collect();
        assert_eq!(moved, vec![root.join("Pdfs/a.pdf"), root.join("Pdfs/c.pdf")]);
    }

    #[test]
    fn test_apply_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("Pdfs")).expect("Failed to create dir");
        fs::write(root.join("Pdfs/a.pdf"), "keep me").expect("Failed to write file");
        fs::write(root.join("a.pdf"), "newcomer").expect("Failed to write file");

        let plan = plan_of(vec![planned(root, "a.pdf", "Pdfs/a.pdf")]);
        let report = Mover::new(true).apply(&plan, root, &OperationContext::new());

        assert_eq!(report.moved, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.record.is_empty());
        let kept = fs::read_to_string(root.join("Pdfs/a.pdf")).expect("Failed to read file");
        assert_eq!(kept, "keep me");
    }

    #[test]
    fn test_apply_reports_progress() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.pdf"), "a").expect("Failed to write file");
        fs::write(root.join("b.pdf"), "b").expect("Failed to write file");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let ctx = OperationContext::new().with_observer(move |e: &ProgressEvent| {
            sink.lock().unwrap().push(e.clone());
        });
        let plan = plan_of(vec![
            planned(root, "a.pdf", "Pdfs/a.pdf"),
            planned(root, "b.pdf", "Pdfs/b.pdf"),
        ]);
        Mover::new(true).apply(&plan, root, &ctx);

        let events = events.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Progress {
                phase: Phase::Moving,
                processed: 2,
                total: Some(2)
            })
        );
        assert_eq!(events.last().and_then(ProgressEvent::fraction), Some(1.0));
    }

    #[test]
    fn test_apply_stops_on_cancel_and_keeps_completed_moves() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            fs::write(root.join(name), name).expect("Failed to write file");
        }

        let ctx = OperationContext::new();
        let token = ctx.cancel_token().clone();
        let ctx = ctx.with_observer(move |e: &ProgressEvent| {
            if let ProgressEvent::Progress { processed: 1, .. } = e {
                token.cancel();
            }
        });
        let plan = plan_of(vec![
            planned(root, "a.pdf", "Pdfs/a.pdf"),
            planned(root, "b.pdf", "Pdfs/b.pdf"),
            planned(root, "c.pdf", "Pdfs/c.pdf"),
        ]);
        let report = Mover::new(true).apply(&plan, root, &ctx);

        assert!(report.cancelled);
        assert_eq!(report.moved, 1);
        assert!(root.join("Pdfs/a.pdf").exists());
        assert!(root.join("b.pdf").exists());
        assert!(root.join("c.pdf").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_relocate_refuses_dangling_symlink_destination() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::create_dir(root.join("Pdfs")).expect("Failed to create dir");
        std::os::unix::fs::symlink("/nonexistent/target.pdf", root.join("Pdfs/a.pdf"))
            .expect("Failed to create symlink");
        fs::write(root.join("a.pdf"), "pdf").expect("Failed to write file");

        let result = relocate(&root.join("a.pdf"), &root.join("Pdfs/a.pdf"));

        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(io::ErrorKind::AlreadyExists)
        );
        assert!(root.join("a.pdf").exists());
        let link = fs::symlink_metadata(root.join("Pdfs/a.pdf")).expect("symlink vanished");
        assert!(link.file_type().is_symlink());
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("Music");
        assert!(ensure_dir(&dir).expect("create failed"));
        assert!(!ensure_dir(&dir).expect("second create failed"));
    }

    #[test]
    fn test_record_serializes_round_trip() {
        let mut record = OperationRecord::new(PathBuf::from("/root"));
        record.add_move(PathBuf::from("/root/a.pdf"), PathBuf::from("/root/Pdfs/a.pdf"));
        let json = serde_json::to_string(&record).expect("serialize failed");
        let back: OperationRecord = serde_json::from_str(&json).expect("deserialize failed");
        assert_eq!(back, record);
    }
}
