//! Recursive directory scanning.
//!
//! Walks the whole tree under a root, classifies every regular file and groups
//! the results into an [`Inventory`]. Traversal is pre-order with entries
//! sorted by name, so repeated scans of an unchanged tree yield the same
//! inventory in the same order.

use crate::classifier::{ExtensionTable, OTHER_CATEGORY};
use crate::config::CompiledFilters;
use crate::error::{FileError, FileErrorKind, SortError, SortResult};
use crate::history::HISTORY_FILE_NAME;
use crate::progress::{OperationContext, Phase};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Directory containing the file.
    pub parent: PathBuf,
    pub file_name: String,
    pub category: String,
}

/// Files of one category, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryBucket {
    pub category: String,
    pub entries: Vec<FileEntry>,
}

/// Result of classifying every file under a root.
///
/// Buckets follow the extension table's order with "Other" last; categories
/// that matched nothing have no bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    root: PathBuf,
    buckets: Vec<CategoryBucket>,
}

impl Inventory {
    fn new(root: PathBuf, table: &ExtensionTable) -> Self {
        let buckets = table
            .category_names()
            .chain(std::iter::once(OTHER_CATEGORY))
            .map(|name| CategoryBucket {
                category: name.to_string(),
                entries: Vec::new(),
            })
            .collect();
        Self { root, buckets }
    }

    fn push(&mut self, entry: FileEntry) {
        match self
            .buckets
            .iter_mut()
            .find(|b| b.category == entry.category)
        {
            Some(bucket) => bucket.entries.push(entry),
            None => self.buckets.push(CategoryBucket {
                category: entry.category.clone(),
                entries: vec![entry],
            }),
        }
    }

    fn drop_empty_buckets(&mut self) {
        self.buckets.retain(|b| !b.entries.is_empty());
    }

    /// The canonical root the scan started from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn buckets(&self) -> &[CategoryBucket] {
        &self.buckets
    }

    /// Entries of one category, empty if none were found.
    pub fn get(&self, category: &str) -> &[FileEntry] {
        self.buckets
            .iter()
            .find(|b| b.category == category)
            .map(|b| b.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Every entry, bucket by bucket.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.buckets.iter().flat_map(|b| b.entries.iter())
    }

    /// `(category, count)` pairs in bucket order.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.buckets
            .iter()
            .map(|b| (b.category.clone(), b.entries.len()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Inventory plus the entries that could not be read.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub inventory: Inventory,
    pub errors: Vec<FileError>,
}

impl ScanReport {
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.inventory.counts()
    }

    pub fn total(&self) -> usize {
        self.inventory.total()
    }
}

/// Walks a directory tree and classifies what it finds.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    table: &'a ExtensionTable,
    filters: Option<&'a CompiledFilters>,
}

impl<'a> Scanner<'a> {
    /// A scanner with no file filters: every regular file is classified.
    pub fn new(table: &'a ExtensionTable) -> Self {
        Self {
            table,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: &'a CompiledFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Scans `root` recursively.
    ///
    /// Fails with [`SortError::DirectoryAccess`] if the root cannot be read,
    /// and with [`SortError::Cancelled`] if the context is cancelled before the
    /// walk finishes. Unreadable entries below the root are recorded in the
    /// report and skipped.
    pub fn scan(&self, root: &Path, ctx: &OperationContext) -> SortResult<ScanReport> {
        let root = open_root(root)?;
        let mut inventory = Inventory::new(root.clone(), self.table);
        let mut errors = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || self.should_descend(&root, entry.path())
            });

        for item in walker {
            if ctx.is_cancelled() {
                log::info!("scan of {} cancelled", root.display());
                return Err(SortError::Cancelled);
            }

            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    let file_error = FileError::new(path, FileErrorKind::Unreadable, err.to_string());
                    log::warn!("skipping unreadable entry: {}", file_error);
                    ctx.file_error(&file_error);
                    errors.push(file_error);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.should_include(&root, entry.path()) {
                continue;
            }

            let path = entry.into_path();
            let Some(file_entry) = self.classify_entry(path) else {
                continue;
            };
            log::debug!("{} -> {}", file_entry.path.display(), file_entry.category);
            inventory.push(file_entry);
            ctx.progress(Phase::Scanning, inventory.total(), None);
        }

        inventory.drop_empty_buckets();
        Ok(ScanReport { inventory, errors })
    }

    fn classify_entry(&self, path: PathBuf) -> Option<FileEntry> {
        let parent = path.parent()?.to_path_buf();
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        let category = self.table.classify(&path).to_string();
        Some(FileEntry {
            path,
            parent,
            file_name,
            category,
        })
    }

    fn should_include(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        if relative == Path::new(HISTORY_FILE_NAME) {
            return false;
        }
        self.filters.is_none_or(|f| f.should_include(relative))
    }

    fn should_descend(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.filters.is_none_or(|f| f.should_descend(relative))
    }
}

/// Scans `root` with `table` and no filters.
pub fn scan(root: &Path, table: &ExtensionTable) -> SortResult<ScanReport> {
    Scanner::new(table).scan(root, &OperationContext::new())
}

/// Canonicalizes the root and checks it can be listed.
pub(crate) fn open_root(root: &Path) -> SortResult<PathBuf> {
    let access_error = |source| SortError::DirectoryAccess {
        path: root.to_path_buf(),
        source,
    };
    let canonical = fs::canonicalize(root).map_err(access_error)?;
    fs::read_dir(&canonical).map_err(access_error)?;
    Ok(canonical)
}
