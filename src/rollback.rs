/// Rollback of journaled relocations.
///
/// This module replays a relocation journal backwards, moving each file from
/// its recorded destination back to its recorded source. The journal file is
/// the only input, so a rollback can run in a different process than the one
/// that performed the moves.
use crate::error::{RelocationError, RelocationResult};
use crate::hasher::{ContentHasher, HasherConfig};
use crate::journal::{JournalEntry, RelocationJournal};
use crate::relocator::move_file;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a rollback run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Source paths that were restored, in replay order.
    pub restored: Vec<PathBuf>,
    /// Destinations that no longer existed and were treated as already undone.
    pub skipped: Vec<PathBuf>,
    /// Occupants moved aside before a restore, as `(original, quarantine)`.
    pub quarantined: Vec<(PathBuf, PathBuf)>,
}

impl RollbackReport {
    /// Returns the total number of journal entries processed.
    pub fn total_processed(&self) -> usize {
        self.restored.len() + self.skipped.len()
    }

    /// True if the run changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.restored.is_empty() && self.quarantined.is_empty()
    }
}

/// Replays relocation journals in reverse.
#[derive(Debug, Clone, Default)]
pub struct RollbackEngine {
    hasher_config: HasherConfig,
}

impl RollbackEngine {
    /// `hasher_config` supplies chunk sizes; the algorithm of each entry is
    /// taken from the journal.
    pub fn new(hasher_config: HasherConfig) -> Self {
        Self { hasher_config }
    }

    /// Undoes every move recorded in `journal_path`, last move first.
    ///
    /// With `strict`, each destination is re-hashed and compared against the
    /// journaled digest before it is moved back. The first mismatch stops the
    /// run with [`RelocationError::IntegrityMismatch`]; entries already
    /// restored stay restored.
    ///
    /// Entries whose destination no longer exists are skipped, which makes a
    /// second rollback of the same journal a no-op. A file occupying a source
    /// path is renamed aside to `<name>.bak.<timestamp>` and never
    /// overwritten.
    ///
    /// The whole journal is parsed before anything is moved, so a malformed
    /// record aborts the run without side effects.
    pub fn rollback(&self, journal_path: &Path, strict: bool) -> RelocationResult<RollbackReport> {
        let entries = RelocationJournal::read_numbered(journal_path)?;
        info!(
            journal = %journal_path.display(),
            entries = entries.len(),
            strict,
            "Starting rollback"
        );

        let mut report = RollbackReport::default();
        for (line, entry) in entries.iter().rev() {
            self.restore_entry(*line, entry, strict, &mut report)?;
        }

        info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            quarantined = report.quarantined.len(),
            "Rollback complete"
        );
        Ok(report)
    }

    fn restore_entry(
        &self,
        line: usize,
        entry: &JournalEntry,
        strict: bool,
        report: &mut RollbackReport,
    ) -> RelocationResult<()> {
        if !destination_present(&entry.destination)? {
            debug!(destination = %entry.destination.display(), "Destination gone, skipping");
            report.skipped.push(entry.destination.clone());
            return Ok(());
        }

        let hasher = ContentHasher::new(HasherConfig {
            algorithm: entry.digest.algorithm,
            ..self.hasher_config
        });

        if strict {
            let actual = hasher.full_digest(&entry.destination)?;
            if actual != entry.digest {
                return Err(RelocationError::IntegrityMismatch {
                    entry: line,
                    destination: entry.destination.clone(),
                    expected: entry.digest.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        if exists(&entry.source)? {
            let quarantine = quarantine_path(&entry.source)?;
            fs::rename(&entry.source, &quarantine).map_err(|e| RelocationError::OccupiedSource {
                path: entry.source.clone(),
                quarantine: quarantine.clone(),
                error: e,
            })?;
            warn!(
                occupant = %entry.source.display(),
                quarantine = %quarantine.display(),
                "Restore target occupied, moved occupant aside"
            );
            report.quarantined.push((entry.source.clone(), quarantine));
        }

        if let Some(parent) = entry.source.parent() {
            fs::create_dir_all(parent).map_err(|e| RelocationError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        // Without strict verification the destination may differ from the
        // journaled digest, so a cross-device copy verifies against itself.
        let expected = strict.then_some(&entry.digest);
        move_file(&entry.destination, &entry.source, &hasher, expected).map_err(|e| {
            RelocationError::MoveFailed {
                source_path: entry.destination.clone(),
                destination: entry.source.clone(),
                error: e,
            }
        })?;
        debug!(
            from = %entry.destination.display(),
            to = %entry.source.display(),
            "Restored"
        );
        report.restored.push(entry.source.clone());
        Ok(())
    }
}

fn exists(path: &Path) -> RelocationResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(RelocationError::file_system(path, e)),
    }
}

/// Like [`exists`], but a destination the file system cannot even hold
/// (name too long, a file where a directory should be) counts as absent.
///
/// Such entries were journaled but their move never happened.
fn destination_present(path: &Path) -> RelocationResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::InvalidFilename | ErrorKind::NotADirectory
            ) =>
        {
            Ok(false)
        }
        Err(e) => Err(RelocationError::file_system(path, e)),
    }
}

/// Generates a free backup path next to `occupied`.
///
/// Example: `file.txt` becomes `file.txt.bak.20251109-143052`, then
/// `file.txt.bak.20251109-143052-2` if that is taken too.
fn quarantine_path(occupied: &Path) -> RelocationResult<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = occupied
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let base = format!("{}.bak.{}", filename, timestamp);

    let mut candidate = occupied.with_file_name(&base);
    let mut counter = 2;
    while exists(&candidate)? {
        candidate = occupied.with_file_name(format!("{}-{}", base, counter));
        counter += 1;
    }
    Ok(candidate)
}
