//! Console output for the CLI.
//!
//! Every line the binary prints goes through here. Library modules never
//! print; they return values that these functions render.

use crate::duplicates::DuplicateScan;
use crate::plan::MovePlan;
use crate::rollback::RollbackReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Consistently styled CLI output.
///
/// Provides:
/// - Status lines (success, error, warning, info)
/// - The move plan and per-category summary
/// - Duplicate groups and rollback reports
/// - A percentage progress bar and a y/N prompt
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    ///
    /// # Example
    ///
    /// ```no_run
    /// use file_sorter::output::OutputFormatter;
    /// OutputFormatter::success("Moved 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    ///
    /// # Example
    ///
    /// ```no_run
    /// use file_sorter::output::OutputFormatter;
    /// OutputFormatter::error("Relocation stopped");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    ///
    /// # Example
    ///
    /// ```no_run
    /// use file_sorter::output::OutputFormatter;
    /// OutputFormatter::info("Sorting into: /home/user/Sorted");
    /// ```
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a bold section header preceded by a blank line.
    ///
    /// # Arguments
    ///
    /// * `header` - The header text
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a yellow `[DRY RUN]` notice.
    ///
    /// # Arguments
    ///
    /// * `message` - What the dry run did not do
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a percentage bar driven by relocation progress callbacks.
    ///
    /// # Returns
    ///
    /// A `ProgressBar` of length 100; positions are percentages.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use file_sorter::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar();
    /// pb.set_position(40);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    /// Lists every planned move in plan order.
    pub fn plan(plan: &MovePlan) {
        Self::header("PLAN");
        for entry in &plan.entries {
            let category = entry
                .category
                .as_deref()
                .map(|c| format!(" [{}]", c))
                .unwrap_or_default();
            println!(
                " - {}{}\n   → {}",
                entry.source.display(),
                category.cyan(),
                entry.destination.display()
            );
        }
        for (path, reason) in &plan.skipped {
            Self::warning(&format!("Skipped {}: {}", path.display(), reason));
        }
    }

    /// Prints file counts per category with a total row.
    ///
    /// # Arguments
    ///
    /// * `category_counts` - Files per category, printed in key order
    /// * `total_files` - Value of the total row
    ///
    /// # Example
    ///
    /// ```no_run
    /// use file_sorter::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 3);
    /// counts.insert("Pictures".to_string(), 1);
    /// OutputFormatter::summary_table(&counts, 4);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = category_counts
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max("Category".len());

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count, "file"),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files, "file"),
            width = width
        );
    }

    /// Prints each duplicate group under its digest prefix, then any
    /// unreadable files and a one-line total.
    ///
    /// Groups confirmed only by sampled digests are marked `(sampled)`.
    pub fn duplicates(scan: &DuplicateScan) {
        if scan.groups.is_empty() {
            Self::success("No duplicates found.");
        }
        for group in &scan.groups {
            let label = if group.exact { "" } else { " (sampled)" };
            Self::header(&format!(
                "{}:{}{}",
                group.digest.algorithm,
                group.digest.short(16),
                label
            ));
            for path in &group.paths {
                println!("   {}", path.display());
            }
        }
        for error in &scan.unreadable {
            Self::warning(&format!("Skipped: {}", error));
        }
        if !scan.groups.is_empty() {
            Self::info(&format!(
                "{} {}, {} redundant {}",
                scan.groups.len(),
                plural(scan.groups.len(), "group"),
                scan.redundant_copies(),
                plural(scan.redundant_copies(), "copy"),
            ));
        }
    }

    /// Prints restored and skipped counts plus one warning per quarantined occupant.
    pub fn rollback(report: &RollbackReport) {
        Self::success(&format!(
            "Restored {} {}",
            report.restored.len(),
            plural(report.restored.len(), "file")
        ));
        if !report.skipped.is_empty() {
            Self::info(&format!(
                "Skipped {} already undone",
                report.skipped.len()
            ));
        }
        for (original, quarantine) in &report.quarantined {
            Self::warning(&format!(
                "{} was occupied; previous occupant kept at {}",
                original.display(),
                quarantine.display()
            ));
        }
    }

    /// Tells the user where the journal is and how to undo the run.
    ///
    /// # Arguments
    ///
    /// * `journal` - Path returned by the relocator
    pub fn journal_hint(journal: &Path) {
        Self::success(&format!("Journal written to {}", journal.display()));
        println!(
            "Run 'file-sorter undo {}' to revert these moves.",
            journal.display()
        );
    }

    /// Asks a yes/no question on stdin. Empty input answers no.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The question, without the `(y/N)` suffix
    ///
    /// # Returns
    ///
    /// `Ok(true)` only for `y` or `yes` (any case); end of input answers no.
    pub fn confirm(prompt: &str) -> io::Result<bool> {
        let stdin = io::stdin();
        let mut input = String::new();
        loop {
            print!("{} (y/N): ", prompt);
            io::stdout().flush()?;
            input.clear();
            if stdin.lock().read_line(&mut input)? == 0 {
                return Ok(false);
            }
            match input.trim().to_uppercase().as_str() {
                "Y" | "YES" => return Ok(true),
                "N" | "NO" | "" => return Ok(false),
                _ => continue,
            }
        }
    }
}

fn plural(count: usize, word: &str) -> String {
    match (count, word) {
        (1, _) => word.to_string(),
        (_, "copy") => "copies".to_string(),
        _ => format!("{}s", word),
    }
}
