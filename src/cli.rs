//! Command-line interface for file-sorter.
//!
//! This module handles:
//! - Argument parsing (`clap` derive)
//! - Orchestration of scan → classify → plan → relocate
//! - Rollback and duplicate reporting
//!
//! All console output is delegated to [`OutputFormatter`].

use crate::classifier::Classifier;
use crate::config::Settings;
use crate::duplicates::{DuplicateFinder, UnreadablePolicy, delete_older_copies};
use crate::hasher::{ContentHasher, HashAlgorithm};
use crate::namer::{DestinationNamer, NamingOptions};
use crate::output::OutputFormatter;
use crate::planner::{Assignment, Planner};
use crate::relocator::Relocator;
use crate::renamer::RenamerChain;
use crate::rollback::RollbackEngine;
use crate::scanner::{ScanOptions, ScanOutcome, Scanner};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Sort files into a destination tree with journaled, reversible moves.
#[derive(Debug, Parser)]
#[command(name = "file-sorter", version, about)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (otherwise $FILE_SORTER_CONFIG, ./.file-sorter.toml, ~/.config/file-sorter/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// A CLI command to execute.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Scan directories, classify files and move them under DEST.
    Move {
        /// Directories (or files) to sort.
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// Destination root; files land in DEST/<Category>/.
        #[arg(long)]
        dest: PathBuf,
        /// Naming pattern, e.g. "{parent}_{date}_{stem}{ext}".
        #[arg(long)]
        pattern: Option<String>,
        /// Leave the parent directory out of new names.
        #[arg(long)]
        no_parent: bool,
        /// Use today's date instead of the file's modification date.
        #[arg(long)]
        today: bool,
        /// Print the plan without moving anything.
        #[arg(long)]
        dry_run: bool,
        /// Write the journal here instead of the journal directory.
        #[arg(long, value_name = "FILE")]
        journal: Option<PathBuf>,
    },
    /// Revert the moves recorded in a journal.
    Undo {
        journal: PathBuf,
        /// Restore even if a file changed since it was moved.
        #[arg(long)]
        no_verify: bool,
    },
    /// Report files with identical content.
    Dupes {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
        /// sha256, sha512 or blake3.
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,
        /// Trust sampled digests without a full-content pass.
        #[arg(long)]
        quick: bool,
        /// Report unreadable files instead of stopping.
        #[arg(long)]
        skip_unreadable: bool,
        /// Delete all but the newest copy in every group.
        #[arg(long)]
        delete_older: bool,
        /// Do not ask before deleting.
        #[arg(long)]
        yes: bool,
    },
}

/// Runs one command against loaded settings.
///
/// # Examples
///
/// ```no_run
/// use file_sorter::cli::{Command, run};
/// use file_sorter::config::Settings;
/// use std::path::PathBuf;
///
/// let settings = Settings::load(None).expect("settings");
/// let command = Command::Undo {
///     journal: PathBuf::from("file-sort-log_20250101_120000_000000.jsonl"),
///     no_verify: false,
/// };
/// run(command, &settings).expect("undo");
/// ```
pub fn run(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Move {
            dirs,
            dest,
            pattern,
            no_parent,
            today,
            dry_run,
            journal,
        } => {
            let mut naming = settings.naming.clone();
            if let Some(pattern) = pattern {
                naming.pattern = pattern;
            }
            naming.include_parent &= !no_parent;
            naming.date_from_mtime &= !today;
            sort_files(
                settings,
                &dirs,
                &dest,
                naming,
                dry_run,
                journal.as_deref(),
            )
        }
        Command::Undo { journal, no_verify } => undo(settings, &journal, !no_verify),
        Command::Dupes {
            dirs,
            algorithm,
            quick,
            skip_unreadable,
            delete_older,
            yes,
        } => {
            let options = DupesOptions {
                algorithm: algorithm.unwrap_or(settings.relocation.algorithm),
                validate_full: settings.relocation.validate_full && !quick,
                skip_unreadable,
                delete_older,
                assume_yes: yes,
            };
            find_duplicates(settings, &dirs, &options)
        }
    }
}

fn scan(settings: &Settings, roots: &[PathBuf]) -> Result<ScanOutcome> {
    let filters = settings
        .filters
        .compile()
        .context("Invalid filter configuration")?;
    let options = ScanOptions {
        skip_hidden: !settings.filters.enable_hidden_files,
        ..ScanOptions::default()
    };
    let outcome = Scanner::new(options).with_filters(&filters).scan(roots);
    for warning in &outcome.warnings {
        OutputFormatter::warning(warning);
    }
    Ok(outcome)
}

/// Scans, classifies, plans and (unless `dry_run`) executes a sort.
fn sort_files(
    settings: &Settings,
    roots: &[PathBuf],
    dest: &Path,
    naming: NamingOptions,
    dry_run: bool,
    journal: Option<&Path>,
) -> Result<()> {
    let dest = std::path::absolute(dest)
        .with_context(|| format!("Cannot resolve destination {}", dest.display()))?;
    OutputFormatter::info(&format!("Sorting into: {}", dest.display()));

    let files = scan(settings, roots)?.files;
    let classifier = Classifier::new(&settings.classification);
    let assignments: Vec<Assignment> = files
        .iter()
        .filter(|file| !file.starts_with(&dest))
        .map(|file| {
            let category = classifier.classify(file);
            Assignment::new(file, dest.join(&category)).with_category(category)
        })
        .collect();

    if assignments.is_empty() {
        OutputFormatter::info("No files found to sort.");
        return Ok(());
    }

    let namer = DestinationNamer::new(naming)?;
    let renamers =
        RenamerChain::from_config(&settings.renamers).context("Invalid renamer rule")?;
    let plan = Planner::new(namer, renamers).plan(&assignments)?;
    OutputFormatter::plan(&plan);

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for entry in &plan.entries {
        let category = entry.category.clone().unwrap_or_default();
        *counts.entry(category).or_insert(0) += 1;
    }

    if dry_run {
        OutputFormatter::summary_table(&counts, plan.len());
        OutputFormatter::dry_run_notice("No files were moved.");
        return Ok(());
    }

    let relocator = Relocator::new(
        ContentHasher::new(settings.relocation.hasher_config()),
        settings.journal_dir(),
    );
    let pb = OutputFormatter::create_progress_bar();
    let mut observer = |percent: u8, message: &str| {
        pb.set_position(u64::from(percent));
        pb.set_message(message.to_string());
    };
    let result = relocator.execute(&plan, journal, Some(&mut observer));
    pb.finish_and_clear();

    let journal_path = result.context("Relocation stopped")?;
    info!(journal = %journal_path.display(), moved = plan.len(), "Sort finished");
    OutputFormatter::summary_table(&counts, plan.len());
    OutputFormatter::journal_hint(&journal_path);
    Ok(())
}

fn undo(settings: &Settings, journal: &Path, verify: bool) -> Result<()> {
    OutputFormatter::info(&format!("Undoing moves from {}", journal.display()));
    let strict = settings.relocation.strict_rollback && verify;
    let report = RollbackEngine::new(settings.relocation.hasher_config())
        .rollback(journal, strict)
        .with_context(|| format!("Rollback of {} stopped", journal.display()))?;
    OutputFormatter::rollback(&report);
    Ok(())
}

struct DupesOptions {
    algorithm: HashAlgorithm,
    validate_full: bool,
    skip_unreadable: bool,
    delete_older: bool,
    assume_yes: bool,
}

fn find_duplicates(settings: &Settings, roots: &[PathBuf], options: &DupesOptions) -> Result<()> {
    if options.delete_older && !options.validate_full {
        bail!("Refusing to delete files matched by sampled digests only; drop --quick");
    }

    let files = scan(settings, roots)?.files;
    let hasher =
        ContentHasher::new(settings.relocation.hasher_config()).for_algorithm(options.algorithm);
    let policy = if options.skip_unreadable {
        UnreadablePolicy::Skip
    } else {
        UnreadablePolicy::Abort
    };
    let scan = DuplicateFinder::new(hasher)
        .with_unreadable_policy(policy)
        .find(&files, options.validate_full)?;
    OutputFormatter::duplicates(&scan);

    if !options.delete_older || scan.groups.is_empty() {
        return Ok(());
    }

    let prompt = format!(
        "Delete {} older copies? This cannot be undone.",
        scan.redundant_copies()
    );
    if !options.assume_yes && !OutputFormatter::confirm(&prompt)? {
        OutputFormatter::info("Nothing deleted.");
        return Ok(());
    }

    let mut deleted = 0;
    for group in &scan.groups {
        for path in delete_older_copies(&group.paths)? {
            OutputFormatter::warning(&format!("Deleted {}", path.display()));
            deleted += 1;
        }
    }
    OutputFormatter::success(&format!("Deleted {} older copies", deleted));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_command() {
        let cli = Cli::try_parse_from([
            "file-sorter",
            "-v",
            "move",
            "/in",
            "/more",
            "--dest",
            "/out",
            "--no-parent",
            "--dry-run",
        ])
        .expect("Valid arguments");

        assert!(cli.verbose);
        match cli.command {
            Command::Move {
                dirs,
                dest,
                no_parent,
                dry_run,
                today,
                ..
            } => {
                assert_eq!(dirs, vec![PathBuf::from("/in"), PathBuf::from("/more")]);
                assert_eq!(dest, PathBuf::from("/out"));
                assert!(no_parent);
                assert!(dry_run);
                assert!(!today);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_dupes_algorithm() {
        let cli = Cli::try_parse_from(["file-sorter", "dupes", "/in", "--algorithm", "blake3"])
            .expect("Valid arguments");
        assert!(matches!(
            cli.command,
            Command::Dupes {
                algorithm: Some(HashAlgorithm::Blake3),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_algorithm() {
        let result = Cli::try_parse_from(["file-sorter", "dupes", "/in", "--algorithm", "md5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_move_requires_dest() {
        let result = Cli::try_parse_from(["file-sorter", "move", "/in"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quick_delete_is_refused() {
        let options = DupesOptions {
            algorithm: HashAlgorithm::Sha256,
            validate_full: false,
            skip_unreadable: false,
            delete_older: true,
            assume_yes: true,
        };
        let result = find_duplicates(&Settings::default(), &[PathBuf::from("/in")], &options);
        assert!(result.is_err());
    }
}
