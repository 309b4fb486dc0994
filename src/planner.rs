//! Turning an inventory into concrete moves.
//!
//! Every file is routed to `root/<category>/<file name>`. Files already sitting
//! directly in their category folder are left alone, which makes sorting
//! idempotent. Name clashes, with files on disk or with destinations handed
//! out earlier in the same plan, are resolved by appending `_1`, `_2`, ... to
//! the file stem.

use crate::classifier::{OTHER_CATEGORY, split_extension};
use crate::error::{FileError, FileErrorKind};
use crate::mover::is_occupied;
use crate::scanner::{FileEntry, Inventory};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Upper bound on `_N` suffixes tried for one file.
pub const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// A single planned relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    /// Collision-free destination inside the category folder.
    pub destination: PathBuf,
    pub category: String,
}

/// The moves for one sort pass, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovePlan {
    pub moves: Vec<PlannedMove>,
    /// Files already in their category folder.
    pub already_correct: usize,
    /// "Other" files left in place because the plan excluded them.
    pub left_unmatched: usize,
    /// Files that could not be given a destination.
    pub errors: Vec<FileError>,
}

impl MovePlan {
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Distinct destination folders, in first-use order.
    pub fn destination_folders(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.moves
            .iter()
            .filter_map(|m| m.destination.parent())
            .filter(|dir| seen.insert(dir.to_path_buf()))
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Builds [`MovePlan`]s.
#[derive(Debug, Clone)]
pub struct Planner {
    max_attempts: u32,
    include_other: bool,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            max_attempts: MAX_COLLISION_ATTEMPTS,
            include_other: true,
        }
    }
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of `_N` suffixes tried before giving up on a file.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether files classified as "Other" are moved into an `Other` folder.
    pub fn include_other(mut self, include_other: bool) -> Self {
        self.include_other = include_other;
        self
    }

    /// Plans moves for every entry of `inventory` relative to `root`.
    pub fn plan(&self, inventory: &Inventory, root: &Path) -> MovePlan {
        let mut plan = MovePlan::default();
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for entry in inventory.entries() {
            if !self.include_other && entry.category == OTHER_CATEGORY {
                plan.left_unmatched += 1;
                continue;
            }

            let category_folder = root.join(&entry.category);
            if entry.parent == category_folder {
                plan.already_correct += 1;
                continue;
            }

            match self.resolve_destination(entry, &category_folder, &claimed) {
                Some(destination) => {
                    claimed.insert(destination.clone());
                    plan.moves.push(PlannedMove {
                        source: entry.path.clone(),
                        destination,
                        category: entry.category.clone(),
                    });
                }
                None => {
                    let err = FileError::new(
                        &entry.path,
                        FileErrorKind::CollisionResolutionExhausted,
                        format!(
                            "no free name for {} in {} after {} attempts",
                            entry.file_name,
                            category_folder.display(),
                            self.max_attempts
                        ),
                    );
                    log::warn!("{}", err);
                    plan.errors.push(err);
                }
            }
        }

        plan
    }

    /// First free candidate among `name`, `name_1`, ... `name_<max>`.
    fn resolve_destination(
        &self,
        entry: &FileEntry,
        category_folder: &Path,
        claimed: &HashSet<PathBuf>,
    ) -> Option<PathBuf> {
        let is_free = |candidate: &Path| !claimed.contains(candidate) && !is_occupied(candidate);

        let direct = category_folder.join(&entry.file_name);
        if is_free(direct.as_path()) {
            return Some(direct);
        }

        let (stem, ext) = split_extension(&entry.file_name);
        (1..=self.max_attempts)
            .map(|n| category_folder.join(format!("{}_{}{}", stem, n, ext.unwrap_or(""))))
            .find(|candidate| is_free(candidate.as_path()))
    }
}

/// Plans with the default planner.
pub fn plan(inventory: &Inventory, root: &Path) -> MovePlan {
    Planner::default().plan(inventory, root)
}
