/// Extension-based file classification.
///
/// An [`ExtensionTable`] is an ordered list of categories, each owning a set of
/// lowercase extensions (with the leading dot). Lookup walks the categories in
/// order and returns the first one that claims the extension, so when two
/// categories share an extension the earlier one wins.
///
/// # Examples
///
/// ```
/// use filesorter::classifier::{ExtensionTable, OTHER_CATEGORY};
///
/// let table = ExtensionTable::default();
/// assert_eq!(table.classify("report.PDF"), "Pdfs");
/// assert_eq!(table.classify("song.mp3"), "Music");
/// assert_eq!(table.classify("notes"), OTHER_CATEGORY);
/// ```
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Category assigned to files no table entry claims.
pub const OTHER_CATEGORY: &str = "Other";

/// One named category and the extensions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Folder name the files are sorted into.
    pub name: String,
    /// Extensions claimed by this category, e.g. `".jpg"`.
    pub extensions: Vec<String>,
}

impl CategoryRule {
    /// Creates a rule, normalizing every extension.
    pub fn new<I, S>(name: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rule = Self {
            name: name.into(),
            extensions: Vec::new(),
        };
        for ext in extensions {
            rule.add_extension(ext.as_ref());
        }
        rule
    }

    /// Adds an extension if the rule does not already claim it.
    pub fn add_extension(&mut self, ext: &str) {
        let ext = normalize_extension(ext);
        if ext.len() > 1 && !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
    }

    pub fn claims(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

/// Ordered mapping from category name to extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CategoryRule>", into = "Vec<CategoryRule>")]
pub struct ExtensionTable {
    categories: Vec<CategoryRule>,
}

impl ExtensionTable {
    /// Creates an empty table; everything classifies as [`OTHER_CATEGORY`].
    pub fn empty() -> Self {
        Self {
            categories: Vec::new(),
        }
    }

    /// Builds a table from rules, keeping their order.
    ///
    /// Rules sharing a name are merged into the first occurrence.
    pub fn from_rules(rules: impl IntoIterator<Item = CategoryRule>) -> Self {
        let mut table = Self::empty();
        for rule in rules {
            table.add_category(rule);
        }
        table
    }

    /// Appends a category, or merges its extensions into an existing one of the
    /// same name without changing that category's position.
    pub fn add_category(&mut self, rule: CategoryRule) {
        let rule = CategoryRule::new(rule.name, rule.extensions);
        match self.categories.iter_mut().find(|c| c.name == rule.name) {
            Some(existing) => {
                for ext in &rule.extensions {
                    existing.add_extension(ext);
                }
            }
            None => self.categories.push(rule),
        }
    }

    /// Builder form of [`add_category`](Self::add_category).
    pub fn with_category<I, S>(mut self, name: &str, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_category(CategoryRule::new(name, extensions));
        self
    }

    pub fn categories(&self) -> &[CategoryRule] {
        &self.categories
    }

    /// Category names in lookup order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Maps a normalized extension to the first category claiming it.
    pub fn category_for_extension(&self, ext: &str) -> Option<&str> {
        let ext = normalize_extension(ext);
        self.categories
            .iter()
            .find(|c| c.claims(&ext))
            .map(|c| c.name.as_str())
    }

    /// Classifies a path by its file name's extension.
    ///
    /// Always returns a category; unmatched files get [`OTHER_CATEGORY`].
    pub fn classify(&self, path: impl AsRef<Path>) -> &str {
        path.as_ref()
            .file_name()
            .map(|n| n.to_string_lossy())
            .and_then(|name| split_extension(&name).1.map(str::to_lowercase))
            .and_then(|ext| self.category_for_extension(&ext))
            .unwrap_or(OTHER_CATEGORY)
    }
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::empty()
            .with_category("Pdfs", [".pdf"])
            .with_category(
                "Images",
                [".png", ".jpeg", ".jpg", ".gif", ".bmp", ".webp", ".svg"],
            )
            .with_category("Music", [".mp3", ".wav", ".flac", ".ogg", ".m4a"])
            .with_category("Videos", [".mp4", ".webm", ".mkv", ".mov", ".avi"])
            .with_category(
                "Documents",
                [".doc", ".docx", ".txt", ".md", ".odt", ".rtf"],
            )
            .with_category("Archives", [".zip", ".tar", ".gz", ".7z", ".rar"])
    }
}

impl From<Vec<CategoryRule>> for ExtensionTable {
    fn from(rules: Vec<CategoryRule>) -> Self {
        Self::from_rules(rules)
    }
}

impl From<ExtensionTable> for Vec<CategoryRule> {
    fn from(table: ExtensionTable) -> Self {
        table.categories
    }
}

/// Lowercases an extension and makes sure it starts with a dot.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// Splits a file name into stem and extension (with its dot).
///
/// The extension is whatever follows the last `.`. Names without a dot,
/// dotfiles like `.bashrc`, and names ending in `.` have no extension.
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            (&file_name[..idx], Some(&file_name[idx..]))
        }
        _ => (file_name, None),
    }
}
