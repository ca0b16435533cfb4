/// Duplicate detection with a two-tier hash strategy.
///
/// Files are first bucketed by a cheap sampled digest. Only buckets with at
/// least two members are re-hashed in full, so the common case of few
/// duplicates costs one sampled digest per file.
use crate::error::{RelocationError, RelocationResult};
use crate::hasher::{ContentDigest, ContentHasher};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// What to do when a file cannot be hashed during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreadablePolicy {
    /// Stop and return the error.
    #[default]
    Abort,
    /// Record the file in [`DuplicateScan::unreadable`] and keep going.
    Skip,
}

/// A set of files believed to share the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// Full digest when `exact`, otherwise the sampled digest.
    pub digest: ContentDigest,
    /// Member paths in input order. Always at least two.
    pub paths: Vec<PathBuf>,
    /// True when membership was confirmed by a full-content digest.
    pub exact: bool,
}

/// Result of a duplicate search.
#[derive(Debug, Default)]
pub struct DuplicateScan {
    /// Groups ordered by digest.
    pub groups: Vec<DuplicateGroup>,
    /// Files skipped under [`UnreadablePolicy::Skip`].
    pub unreadable: Vec<RelocationError>,
}

impl DuplicateScan {
    /// Returns the groups as a digest-keyed map.
    pub fn as_map(&self) -> BTreeMap<&ContentDigest, &[PathBuf]> {
        self.groups
            .iter()
            .map(|group| (&group.digest, group.paths.as_slice()))
            .collect()
    }

    /// Number of files that could be removed while keeping one copy per group.
    pub fn redundant_copies(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len() - 1).sum()
    }
}

/// Groups files by identical content.
pub struct DuplicateFinder {
    hasher: ContentHasher,
    on_unreadable: UnreadablePolicy,
}

impl DuplicateFinder {
    pub fn new(hasher: ContentHasher) -> Self {
        Self {
            hasher,
            on_unreadable: UnreadablePolicy::default(),
        }
    }

    pub fn with_unreadable_policy(mut self, policy: UnreadablePolicy) -> Self {
        self.on_unreadable = policy;
        self
    }

    /// Finds duplicate clusters among `files`.
    ///
    /// With `validate_full`, sampled buckets are re-bucketed by full digest and
    /// only exact duplicates are returned. Without it, sampled buckets are
    /// trusted as-is: faster, but two different large files sharing head and
    /// tail bytes will be reported together.
    ///
    /// Repeated input paths are considered once.
    pub fn find(&self, files: &[PathBuf], validate_full: bool) -> RelocationResult<DuplicateScan> {
        let mut scan = DuplicateScan::default();
        let unique = unique_paths(files);
        info!(
            files = unique.len(),
            algorithm = %self.hasher.algorithm(),
            validate_full,
            "Searching for duplicates"
        );

        let mut sampled: BTreeMap<ContentDigest, Vec<PathBuf>> = BTreeMap::new();
        for path in unique {
            if let Some(digest) = self.digest_or_skip(&path, false, &mut scan)? {
                sampled.entry(digest).or_default().push(path);
            }
        }

        let mut groups: BTreeMap<ContentDigest, (Vec<PathBuf>, bool)> = BTreeMap::new();
        for (digest, bucket) in sampled {
            if bucket.len() < 2 {
                continue;
            }
            if !validate_full {
                groups.insert(digest, (bucket, false));
                continue;
            }

            debug!(candidates = bucket.len(), sampled = %digest, "Confirming with full digest");
            let mut full: BTreeMap<ContentDigest, Vec<PathBuf>> = BTreeMap::new();
            for path in bucket {
                if let Some(digest) = self.digest_or_skip(&path, true, &mut scan)? {
                    full.entry(digest).or_default().push(path);
                }
            }
            for (digest, paths) in full {
                if paths.len() >= 2 {
                    groups.insert(digest, (paths, true));
                }
            }
        }

        scan.groups = groups
            .into_iter()
            .map(|(digest, (paths, exact))| DuplicateGroup {
                digest,
                paths,
                exact,
            })
            .collect();

        info!(
            groups = scan.groups.len(),
            unreadable = scan.unreadable.len(),
            "Duplicate search finished"
        );
        Ok(scan)
    }

    fn digest_or_skip(
        &self,
        path: &Path,
        full: bool,
        scan: &mut DuplicateScan,
    ) -> RelocationResult<Option<ContentDigest>> {
        let result = if full {
            self.hasher.full_digest(path)
        } else {
            self.hasher.sampled_digest(path)
        };
        match (result, self.on_unreadable) {
            (Ok(digest), _) => Ok(Some(digest)),
            (Err(e), UnreadablePolicy::Skip) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                scan.unreadable.push(e);
                Ok(None)
            }
            (Err(e), UnreadablePolicy::Abort) => Err(e),
        }
    }
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self::new(ContentHasher::default())
    }
}

/// Keeps the newest member of `group` and deletes every other one.
///
/// Ties on modification time keep the first member encountered. This is
/// destructive and writes no journal entry: callers must obtain explicit
/// confirmation first.
///
/// All members are inspected before anything is deleted, so a missing member
/// aborts the call without side effects.
pub fn delete_older_copies(group: &[PathBuf]) -> RelocationResult<Vec<PathBuf>> {
    let members = unique_paths(group);
    if members.len() < 2 {
        return Ok(Vec::new());
    }

    let mut stamped: Vec<(PathBuf, SystemTime)> = Vec::with_capacity(members.len());
    for path in members {
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| RelocationError::file_system(&path, e))?;
        stamped.push((path, modified));
    }

    let mut keep = 0;
    for (index, (_, modified)) in stamped.iter().enumerate() {
        if *modified > stamped[keep].1 {
            keep = index;
        }
    }

    let mut deleted = Vec::new();
    for (index, (path, _)) in stamped.into_iter().enumerate() {
        if index == keep {
            continue;
        }
        fs::remove_file(&path).map_err(|e| RelocationError::DeleteFailed {
            path: path.clone(),
            source: e,
        })?;
        warn!(path = %path.display(), "Deleted older duplicate");
        deleted.push(path);
    }
    Ok(deleted)
}

fn unique_paths(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen: HashSet<&PathBuf> = HashSet::new();
    files
        .iter()
        .filter(|path| seen.insert(*path))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{HashAlgorithm, HasherConfig};
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    fn set_mtime(path: &Path, secs_after_epoch: u64) {
        let file = File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file");
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
            .expect("Failed to set mtime");
    }

    #[test]
    fn test_groups_identical_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"same");
        let b = write(temp_dir.path(), "b/b.txt", b"same");
        let c = write(temp_dir.path(), "c.txt", b"diff");

        let scan = DuplicateFinder::default()
            .find(&[a.clone(), b.clone(), c], true)
            .expect("Duplicate search failed");

        assert_eq!(scan.groups.len(), 1);
        assert_eq!(scan.groups[0].paths, vec![a, b]);
        assert!(scan.groups[0].exact);
        assert_eq!(scan.redundant_copies(), 1);
    }

    #[test]
    fn test_full_validation_splits_sampled_collisions() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.bin", b"HEAD-aaaa-TAIL");
        let b = write(temp_dir.path(), "b.bin", b"HEAD-bbbb-TAIL");
        let hasher = ContentHasher::new(HasherConfig {
            algorithm: HashAlgorithm::Sha256,
            sample_size: 4,
            chunk_size: 16,
        });
        let finder = DuplicateFinder::new(hasher);

        let approximate = finder
            .find(&[a.clone(), b.clone()], false)
            .expect("Quick search failed");
        assert_eq!(approximate.groups.len(), 1);
        assert!(!approximate.groups[0].exact);

        let exact = finder.find(&[a, b], true).expect("Full search failed");
        assert!(exact.groups.is_empty());
    }

    #[test]
    fn test_repeated_input_path_is_not_its_own_duplicate() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"only one");

        let scan = DuplicateFinder::default()
            .find(&[a.clone(), a], true)
            .expect("Duplicate search failed");
        assert!(scan.groups.is_empty());
    }

    #[test]
    fn test_unreadable_file_aborts_by_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"x");
        let missing = temp_dir.path().join("gone.txt");

        let result = DuplicateFinder::default().find(&[a, missing], true);
        assert!(matches!(
            result,
            Err(RelocationError::ContentUnreadable { .. })
        ));
    }

    #[test]
    fn test_unreadable_file_is_reported_when_skipping() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"dup");
        let b = write(temp_dir.path(), "b.txt", b"dup");
        let missing = temp_dir.path().join("gone.txt");

        let scan = DuplicateFinder::default()
            .with_unreadable_policy(UnreadablePolicy::Skip)
            .find(&[a, missing, b], true)
            .expect("Duplicate search failed");
        assert_eq!(scan.groups.len(), 1);
        assert_eq!(scan.unreadable.len(), 1);
    }

    #[test]
    fn test_as_map_keys_by_digest() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"one");
        let b = write(temp_dir.path(), "b.txt", b"one");
        let c = write(temp_dir.path(), "c.txt", b"two");
        let d = write(temp_dir.path(), "d.txt", b"two");

        let scan = DuplicateFinder::default()
            .find(&[a, b, c, d], true)
            .expect("Duplicate search failed");
        let map = scan.as_map();
        assert_eq!(map.len(), 2);
        assert!(map.values().all(|paths| paths.len() == 2));
    }

    #[test]
    fn test_delete_older_copies_keeps_newest() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let old = write(temp_dir.path(), "old.txt", b"dup");
        let new = write(temp_dir.path(), "new.txt", b"dup");
        let older = write(temp_dir.path(), "older.txt", b"dup");
        set_mtime(&old, 2_000);
        set_mtime(&new, 3_000);
        set_mtime(&older, 1_000);

        let deleted = delete_older_copies(&[old.clone(), new.clone(), older.clone()])
            .expect("Delete failed");

        assert_eq!(deleted, vec![old.clone(), older.clone()]);
        assert!(new.exists());
        assert!(!old.exists());
        assert!(!older.exists());
    }

    #[test]
    fn test_delete_older_copies_tie_keeps_first() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let first = write(temp_dir.path(), "first.txt", b"dup");
        let second = write(temp_dir.path(), "second.txt", b"dup");
        set_mtime(&first, 5_000);
        set_mtime(&second, 5_000);

        let deleted =
            delete_older_copies(&[first.clone(), second.clone()]).expect("Delete failed");
        assert_eq!(deleted, vec![second]);
        assert!(first.exists());
    }

    #[test]
    fn test_delete_older_copies_missing_member_deletes_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = write(temp_dir.path(), "a.txt", b"dup");
        let missing = temp_dir.path().join("missing.txt");

        let result = delete_older_copies(&[a.clone(), missing]);
        assert!(result.is_err());
        assert!(a.exists());
    }
}
