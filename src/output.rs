//! Output formatting and styling for the command-line front end.
//!
//! Everything the binary prints goes through [`OutputFormatter`], so colors,
//! symbols and the progress bar look the same across commands. The library
//! core never prints; it only logs.

use crate::error::FileError;
use crate::progress::{Phase, ProgressEvent};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Styled terminal output.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn preview_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Lists per-file failures under a heading.
    pub fn file_errors(errors: &[FileError]) {
        if errors.is_empty() {
            return;
        }
        Self::warning(&format!("{} file(s) could not be processed:", errors.len()));
        for err in errors {
            eprintln!("    {} {}", "-".red(), err);
        }
    }

    /// A progress bar for moves and restores.
    ///
    /// Starts as a spinner; the first event with a known total turns it into a
    /// bar of that length.
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Feeds one core progress event into a progress bar.
    pub fn render_progress(pb: &ProgressBar, event: &ProgressEvent) {
        match event {
            ProgressEvent::Progress {
                phase,
                processed,
                total: Some(total),
            } => {
                pb.set_length(*total as u64);
                pb.set_position(*processed as u64);
                pb.set_message(phase.to_string());
            }
            ProgressEvent::Progress {
                phase: Phase::Scanning,
                processed,
                total: None,
            } => {
                pb.set_message(format!("scanned {} files", processed));
                pb.tick();
            }
            ProgressEvent::Progress { .. } => pb.tick(),
            ProgressEvent::FileError { path, message } => {
                pb.println(format!("{} {}: {}", "✗".red(), path.display(), message));
            }
        }
    }

    /// Prints a summary table with file counts by category.
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = max_category_len
        );
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
