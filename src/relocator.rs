/// Journaled execution of move plans.
///
/// A run is admitted only if the whole plan is valid and no destination
/// exists yet; otherwise nothing is touched. After admission each entry is
/// digested, journaled and only then moved, so an interrupted run always
/// leaves the journal describing at least every move that happened.
///
/// The destination existence check and the move are separate steps. Another
/// process creating the same path in between is not guarded against.
use crate::error::{RelocationError, RelocationResult};
use crate::hasher::{ContentDigest, ContentHasher};
use crate::journal::{JournalEntry, RelocationJournal};
use crate::plan::MovePlan;
use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Receives progress updates from [`Relocator::execute`].
///
/// Called synchronously on the caller's thread after every completed move.
pub trait ProgressObserver {
    fn on_progress(&mut self, percent: u8, message: &str);
}

impl<F> ProgressObserver for F
where
    F: FnMut(u8, &str),
{
    fn on_progress(&mut self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Executes move plans against the file system.
#[derive(Debug, Clone)]
pub struct Relocator {
    hasher: ContentHasher,
    journal_dir: PathBuf,
}

impl Relocator {
    /// `journal_dir` is where journals without an explicit path are created.
    pub fn new(hasher: ContentHasher, journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            hasher,
            journal_dir: journal_dir.into(),
        }
    }

    pub fn journal_dir(&self) -> &Path {
        &self.journal_dir
    }

    /// Runs `plan` and returns the path of the journal that records it.
    ///
    /// # Errors
    ///
    /// * [`RelocationError::InvalidPlan`] / [`RelocationError::DestinationCollision`]
    ///   before any side effect
    /// * [`RelocationError::ContentUnreadable`] if a source cannot be hashed;
    ///   the entry is not journaled and the run stops
    /// * [`RelocationError::MoveFailed`] if a journaled move fails; the run stops
    ///   and earlier moves stay in place
    pub fn execute(
        &self,
        plan: &MovePlan,
        journal_path: Option<&Path>,
        mut observer: Option<&mut dyn ProgressObserver>,
    ) -> RelocationResult<PathBuf> {
        Self::admit(plan)?;

        let mut journal = RelocationJournal::open(journal_path, &self.journal_dir)?;
        info!(
            entries = plan.len(),
            journal = %journal.path().display(),
            "Starting relocation"
        );

        let total = plan.len();
        for (index, entry) in plan.entries.iter().enumerate() {
            if let Some(parent) = entry.destination.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    RelocationError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    }
                })?;
            }

            let (digest, size) = self.hasher.full_digest_with_size(&entry.source)?;
            journal.append(&JournalEntry::new(
                entry.source.clone(),
                entry.destination.clone(),
                digest.clone(),
                size,
            ))?;

            move_file(&entry.source, &entry.destination, &self.hasher, Some(&digest)).map_err(
                |e| RelocationError::MoveFailed {
                    source_path: entry.source.clone(),
                    destination: entry.destination.clone(),
                    error: e,
                },
            )?;
            debug!(
                source = %entry.source.display(),
                destination = %entry.destination.display(),
                digest = %digest.short(12),
                "Moved"
            );

            if let Some(observer) = observer.as_deref_mut() {
                let percent = ((index + 1) * 100 / total) as u8;
                let name = entry
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                observer.on_progress(percent, &name);
            }
        }

        info!(moved = total, journal = %journal.path().display(), "Relocation complete");
        Ok(journal.path().to_path_buf())
    }

    /// All-or-nothing admission: structural checks plus on-disk collisions.
    fn admit(plan: &MovePlan) -> RelocationResult<()> {
        plan.validate()?;
        for entry in &plan.entries {
            match fs::symlink_metadata(&entry.destination) {
                Ok(_) => {
                    return Err(RelocationError::DestinationCollision {
                        path: entry.destination.clone(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(RelocationError::file_system(&entry.destination, e)),
            }
        }
        Ok(())
    }
}

/// Moves one file, falling back to copy + verify + delete across devices.
///
/// `expected` is the source digest if already known. A failed fallback never
/// leaves a partial copy behind.
pub(crate) fn move_file(
    source: &Path,
    destination: &Path,
    hasher: &ContentHasher,
    expected: Option<&ContentDigest>,
) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) => {
            debug!(source = %source.display(), "Rename crosses devices, copying instead");
            copy_verified(source, destination, hasher, expected)?;
            fs::remove_file(source)
        }
        Err(e) => Err(e),
    }
}

fn copy_verified(
    source: &Path,
    destination: &Path,
    hasher: &ContentHasher,
    expected: Option<&ContentDigest>,
) -> io::Result<()> {
    let result = (|| -> io::Result<()> {
        let expected = match expected {
            Some(digest) => digest.clone(),
            None => hasher.full_digest(source).map_err(io::Error::other)?,
        };
        fs::copy(source, destination)?;
        if let Ok(modified) = fs::metadata(source).and_then(|m| m.modified()) {
            File::options()
                .write(true)
                .open(destination)
                .and_then(|f| f.set_modified(modified))?;
        }
        let actual = hasher.full_digest(destination).map_err(io::Error::other)?;
        if actual != expected {
            return Err(io::Error::other(format!(
                "copy verification failed: expected {}, found {}",
                expected, actual
            )));
        }
        Ok(())
    })();

    if result.is_err()
        && let Err(e) = fs::remove_file(destination)
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %destination.display(), error = %e, "Could not remove partial copy");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlannedMove;
    use tempfile::TempDir;

    fn relocator(temp_dir: &TempDir) -> Relocator {
        Relocator::new(ContentHasher::default(), temp_dir.path().join("journals"))
    }

    #[test]
    fn test_execute_moves_and_journals() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("in").join("a.txt");
        fs::create_dir_all(source.parent().expect("Has parent")).expect("Failed to create dir");
        fs::write(&source, "alpha").expect("Failed to write file");
        let destination = temp_dir.path().join("out").join("nested").join("a.txt");

        let plan = MovePlan::new(vec![PlannedMove::new(&source, &destination)]);
        let journal_path = relocator(&temp_dir)
            .execute(&plan, None, None)
            .expect("Failed to execute plan");

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination).expect("Read"), "alpha");
        assert!(journal_path.starts_with(temp_dir.path().join("journals")));

        let entries = RelocationJournal::read_all(&journal_path).expect("Failed to read journal");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, source);
        assert_eq!(entries[0].destination, destination);
        assert_eq!(entries[0].size_bytes, 5);
    }

    #[test]
    fn test_existing_destination_blocks_whole_plan() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let first = temp_dir.path().join("first.txt");
        let second = temp_dir.path().join("second.txt");
        fs::write(&first, "1").expect("Failed to write file");
        fs::write(&second, "2").expect("Failed to write file");
        let taken = temp_dir.path().join("out").join("second.txt");
        fs::create_dir_all(taken.parent().expect("Has parent")).expect("Failed to create dir");
        fs::write(&taken, "occupied").expect("Failed to write file");

        let plan = MovePlan::from_pairs([
            (first.clone(), temp_dir.path().join("out").join("first.txt")),
            (second.clone(), taken.clone()),
        ]);
        let result = relocator(&temp_dir).execute(&plan, None, None);

        assert!(matches!(
            result,
            Err(RelocationError::DestinationCollision { ref path }) if *path == taken
        ));
        assert!(first.exists());
        assert!(second.exists());
        assert!(!temp_dir.path().join("journals").exists());
    }

    #[test]
    fn test_progress_is_reported_per_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut pairs = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            let source = temp_dir.path().join(name);
            fs::write(&source, name).expect("Failed to write file");
            pairs.push((source, temp_dir.path().join("out").join(name)));
        }

        let mut updates: Vec<(u8, String)> = Vec::new();
        let mut observer = |percent: u8, message: &str| updates.push((percent, message.to_string()));
        relocator(&temp_dir)
            .execute(&MovePlan::from_pairs(pairs), None, Some(&mut observer))
            .expect("Failed to execute plan");

        assert_eq!(
            updates,
            vec![
                (25, "a.txt".to_string()),
                (50, "b.txt".to_string()),
                (75, "c.txt".to_string()),
                (100, "d.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_unreadable_source_stops_before_journaling() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let present = temp_dir.path().join("present.txt");
        fs::write(&present, "here").expect("Failed to write file");
        let missing = temp_dir.path().join("missing.txt");
        let journal = temp_dir.path().join("run.jsonl");

        let plan = MovePlan::from_pairs([
            (present.clone(), temp_dir.path().join("out").join("present.txt")),
            (missing.clone(), temp_dir.path().join("out").join("missing.txt")),
        ]);
        let result = relocator(&temp_dir).execute(&plan, Some(&journal), None);

        assert!(matches!(
            result,
            Err(RelocationError::ContentUnreadable { ref path, .. }) if *path == missing
        ));
        let entries = RelocationJournal::read_all(&journal).expect("Failed to read journal");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, present);
    }

    #[test]
    fn test_explicit_journal_path_must_be_new() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let journal = temp_dir.path().join("run.jsonl");
        fs::write(&journal, "").expect("Failed to write file");

        let result = relocator(&temp_dir).execute(&MovePlan::default(), Some(&journal), None);
        assert!(matches!(
            result,
            Err(RelocationError::JournalWriteFailed { .. })
        ));
    }

    #[test]
    fn test_copy_verified_preserves_content_and_mtime() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.bin");
        let destination = temp_dir.path().join("copy.bin");
        fs::write(&source, vec![7_u8; 4096]).expect("Failed to write file");

        copy_verified(&source, &destination, &ContentHasher::default(), None)
            .expect("Failed to copy");

        assert_eq!(
            fs::read(&destination).expect("Read"),
            fs::read(&source).expect("Read")
        );
        let source_mtime = fs::metadata(&source).and_then(|m| m.modified()).expect("mtime");
        let copy_mtime = fs::metadata(&destination).and_then(|m| m.modified()).expect("mtime");
        assert_eq!(source_mtime, copy_mtime);
    }

    #[test]
    fn test_copy_verified_removes_copy_on_mismatch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("source.txt");
        let destination = temp_dir.path().join("copy.txt");
        fs::write(&source, "real").expect("Failed to write file");

        let hasher = ContentHasher::default();
        let wrong = ContentDigest::new(hasher.algorithm(), "00");
        let result = copy_verified(&source, &destination, &hasher, Some(&wrong));

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(source.exists());
    }
}
