//! Command-line interface for filesorter.
//!
//! Parses arguments, wires a [`Session`] to the configuration and the on-disk
//! history file, and renders progress and results with [`OutputFormatter`].

use crate::config::SorterConfig;
use crate::history::{History, UndoReport};
use crate::output::OutputFormatter;
use crate::progress::{OperationContext, ProgressEvent};
use crate::session::{Session, SortOptions, SortReport};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Sort the files of a directory into category folders by extension.
#[derive(Debug, Parser)]
#[command(name = "filesorter", version, about)]
pub struct Cli {
    /// Directory to sort
    pub dir: PathBuf,

    /// Show what would be moved without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Reverse the most recent sort of this directory
    #[arg(long, conflicts_with_all = ["dry_run", "no_create_folders", "skip_other"])]
    pub undo: bool,

    /// Do not create missing category folders
    #[arg(long)]
    pub no_create_folders: bool,

    /// Leave files with unknown extensions where they are
    #[arg(long)]
    pub skip_other: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn to_command(&self) -> SortCommand {
        if self.undo {
            SortCommand::Undo
        } else {
            SortCommand::Sort(SortOptions {
                preview_mode: self.dry_run,
                create_folders: !self.no_create_folders,
                include_other: !self.skip_other,
            })
        }
    }

    /// Log filter matching the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortCommand {
    Sort(SortOptions),
    Undo,
}

/// Runs one command against `dir`.
///
/// The undo history lives in `<dir>/.filesorter_history.json`; it is loaded
/// before the command and written back after any change.
///
/// # Examples
///
/// ```no_run
/// use filesorter::cli::{run_cli, SortCommand};
/// use filesorter::session::SortOptions;
/// use std::path::Path;
///
/// let result = run_cli(SortCommand::Sort(SortOptions::default()), Path::new("/path/to/directory"), None);
/// if let Err(e) = result {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(command: SortCommand, dir: &Path, config_path: Option<&Path>) -> Result<(), String> {
    let config = SorterConfig::load(config_path)
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let session =
        Session::from_config(&config).map_err(|e| format!("Error compiling filters: {}", e))?;

    let history_path = History::default_path(dir);
    let history = History::load(&history_path).map_err(|e| e.to_string())?;
    session.set_history(history);

    match command {
        SortCommand::Sort(options) if options.preview_mode => preview(&session, dir, options),
        SortCommand::Sort(options) => sort(&session, dir, options, &history_path),
        SortCommand::Undo => undo(&session, &history_path),
    }
}

fn preview(session: &Session, dir: &Path, options: SortOptions) -> Result<(), String> {
    OutputFormatter::preview_notice(&format!("Analyzing contents of: {}", dir.display()));
    let report = session.sort(dir, options).map_err(|e| e.to_string())?;

    if report.planned.is_empty() {
        OutputFormatter::info("Nothing to move.");
    }
    for planned in &report.planned {
        OutputFormatter::plain(&format!(
            " - {} → {}",
            relative(&planned.source, &report.root).display(),
            relative(&planned.destination, &report.root).display()
        ));
    }

    print_summary(&report);
    OutputFormatter::success("Dry run complete. No files were modified.");
    Ok(())
}

fn sort(
    session: &Session,
    dir: &Path,
    options: SortOptions,
    history_path: &Path,
) -> Result<(), String> {
    OutputFormatter::info(&format!("Sorting contents of: {}", dir.display()));

    let bar = OutputFormatter::create_progress_bar();
    let observer = bar.clone();
    let ctx = OperationContext::new().with_observer(move |event: &ProgressEvent| {
        OutputFormatter::render_progress(&observer, event)
    });
    let result = session.sort_with(dir, options, &ctx);
    bar.finish_and_clear();
    let report = result.map_err(|e| e.to_string())?;

    if report.recorded {
        save_history(session, history_path)?;
    }

    print_summary(&report);
    OutputFormatter::file_errors(&report.errors);

    if report.cancelled {
        OutputFormatter::warning("Sort was cancelled before all files were moved.");
    } else if report.moved == 0 {
        OutputFormatter::success("Nothing to move; directory is already sorted.");
    } else {
        OutputFormatter::success(&format!("Moved {} file(s).", report.moved));
    }
    if report.recorded {
        OutputFormatter::plain(&format!(
            "Use 'filesorter {} --undo' to revert changes.",
            dir.display()
        ));
    }
    Ok(())
}

fn undo(session: &Session, history_path: &Path) -> Result<(), String> {
    OutputFormatter::info("Undoing previous sort...");

    let bar = OutputFormatter::create_progress_bar();
    let observer = bar.clone();
    let ctx = OperationContext::new().with_observer(move |event: &ProgressEvent| {
        OutputFormatter::render_progress(&observer, event)
    });
    let result = session.undo_with(&ctx);
    bar.finish_and_clear();
    let report = result.map_err(|e| e.to_string())?;

    save_history(session, history_path)?;
    print_undo(&report);
    Ok(())
}

fn save_history(session: &Session, history_path: &Path) -> Result<(), String> {
    let history = session.history_snapshot();
    if history.is_empty() {
        if history_path.exists() {
            fs::remove_file(history_path).map_err(|e| {
                format!(
                    "Could not remove history file {}: {}",
                    history_path.display(),
                    e
                )
            })?;
        }
        return Ok(());
    }
    history.save(history_path).map_err(|e| e.to_string())
}

fn print_summary(report: &SortReport) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for planned in &report.planned {
        *counts.entry(planned.category.clone()).or_insert(0) += 1;
    }
    if !counts.is_empty() {
        OutputFormatter::summary_table(&counts, report.planned.len());
    }
    if report.skipped_already_correct > 0 {
        OutputFormatter::plain(&format!(
            "{} file(s) already in place",
            report.skipped_already_correct
        ));
    }
    if report.skipped_unmatched > 0 {
        OutputFormatter::plain(&format!(
            "{} file(s) with unknown extensions left in place",
            report.skipped_unmatched
        ));
    }
}

fn print_undo(report: &UndoReport) {
    OutputFormatter::success(&format!(
        "Restored {} of {} file(s).",
        report.moved_back,
        report.record.moves.len()
    ));
    OutputFormatter::file_errors(&report.errors);
    if report.cancelled {
        OutputFormatter::warning("Undo was cancelled; the remaining files stay sorted.");
    }
}

fn relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("arguments should parse")
    }

    #[test]
    fn test_default_command_is_sort() {
        let cli = parse(&["filesorter", "/tmp/downloads"]);
        assert_eq!(cli.to_command(), SortCommand::Sort(SortOptions::default()));
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_flags_map_to_options() {
        let cli = parse(&[
            "filesorter",
            "dir",
            "--dry-run",
            "--no-create-folders",
            "--skip-other",
            "-vv",
        ]);
        assert_eq!(
            cli.to_command(),
            SortCommand::Sort(SortOptions {
                preview_mode: true,
                create_folders: false,
                include_other: false,
            })
        );
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn test_undo_conflicts_with_dry_run() {
        assert!(Cli::try_parse_from(["filesorter", "dir", "--undo", "--dry-run"]).is_err());
        assert_eq!(parse(&["filesorter", "dir", "--undo"]).to_command(), SortCommand::Undo);
    }

    #[test]
    fn test_run_cli_sort_then_undo_round_trips_history_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "").expect("Failed to write config");
        let work = temp_dir.path().join("work");
        fs::create_dir(&work).expect("Failed to create work dir");
        fs::write(work.join("a.pdf"), "pdf").expect("Failed to write file");

        run_cli(
            SortCommand::Sort(SortOptions::default()),
            &work,
            Some(&config_path),
        )
        .expect("sort failed");
        assert!(work.join("Pdfs/a.pdf").exists());
        assert!(History::default_path(&work).exists());

        run_cli(SortCommand::Undo, &work, Some(&config_path)).expect("undo failed");
        assert!(work.join("a.pdf").exists());
        assert!(!History::default_path(&work).exists());
    }

    #[test]
    fn test_run_cli_undo_without_history_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "").expect("Failed to write config");

        let err = run_cli(SortCommand::Undo, temp_dir.path(), Some(&config_path)).unwrap_err();
        assert!(err.contains("no previous sort"));
    }

    #[test]
    fn test_run_cli_missing_config_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let missing = temp_dir.path().join("missing.toml");

        let result = run_cli(
            SortCommand::Sort(SortOptions::default()),
            temp_dir.path(),
            Some(&missing),
        );
        assert!(result.is_err());
    }
}
