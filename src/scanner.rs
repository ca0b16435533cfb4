//! Recursive file discovery.
//!
//! Produces the flat, sorted list of absolute file paths that the planner and
//! duplicate finder consume.

use crate::config::CompiledFilters;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Options for [`Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    pub skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: true,
        }
    }
}

/// Result of a scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Absolute paths of regular files, sorted and unique.
    pub files: Vec<PathBuf>,
    /// Entries that could not be read while walking.
    pub warnings: Vec<String>,
}

/// Walks root paths and lists the regular files that pass the filters.
pub struct Scanner<'a> {
    options: ScanOptions,
    filters: Option<&'a CompiledFilters>,
}

impl<'a> Scanner<'a> {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: &'a CompiledFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Scans every root. A root may be a single file.
    ///
    /// Walk errors do not abort the scan; they are collected as warnings.
    pub fn scan(&self, roots: &[PathBuf]) -> ScanOutcome {
        let mut files = BTreeSet::new();
        let mut warnings = Vec::new();

        for root in roots {
            let root = match std::path::absolute(root) {
                Ok(root) => root,
                Err(e) => {
                    warnings.push(format!("cannot resolve {}: {}", root.display(), e));
                    continue;
                }
            };

            let walker = WalkDir::new(&root).follow_links(self.options.follow_symlinks);
            let iter = walker.into_iter().filter_entry(|entry| {
                entry.depth() == 0 || !(self.options.skip_hidden && is_hidden(entry.path()))
            });

            for item in iter {
                let entry = match item {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(root = %root.display(), error = %err, "Walk error");
                        warnings.push(format!("walk error under {}: {}", root.display(), err));
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(filters) = self.filters {
                    let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                    let candidate = if relative.as_os_str().is_empty() {
                        entry.path()
                    } else {
                        relative
                    };
                    if !filters.should_include(candidate) {
                        debug!(path = %entry.path().display(), "Filtered out");
                        continue;
                    }
                }
                files.insert(entry.into_path());
            }
        }

        debug!(files = files.len(), roots = roots.len(), "Scan complete");
        ScanOutcome {
            files: files.into_iter().collect(),
            warnings,
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcludeRules, FilterRules, IncludeRules};
    use std::fs;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        for (path, content) in [
            ("b.txt", "b"),
            ("a.txt", "a"),
            ("nested/deep/c.log", "c"),
            (".hidden/secret.txt", "s"),
            (".dotfile", "d"),
        ] {
            let full = root.join(path);
            fs::create_dir_all(full.parent().expect("Has parent")).expect("Failed to create dir");
            fs::write(full, content).expect("Failed to write file");
        }
    }

    #[test]
    fn test_scan_is_recursive_sorted_and_skips_hidden() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        populate(temp_dir.path());

        let outcome = Scanner::new(ScanOptions::default()).scan(&[temp_dir.path().to_path_buf()]);

        let root = temp_dir.path();
        assert_eq!(
            outcome.files,
            vec![
                root.join("a.txt"),
                root.join("b.txt"),
                root.join("nested/deep/c.log"),
            ]
        );
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_overlapping_roots_are_deduplicated() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        populate(temp_dir.path());

        let outcome = Scanner::new(ScanOptions::default()).scan(&[
            temp_dir.path().to_path_buf(),
            temp_dir.path().join("nested"),
            temp_dir.path().join("a.txt"),
        ]);
        assert_eq!(outcome.files.len(), 3);
    }

    #[test]
    fn test_hidden_entries_included_when_requested() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        populate(temp_dir.path());

        let outcome = Scanner::new(ScanOptions {
            skip_hidden: false,
            ..ScanOptions::default()
        })
        .scan(&[temp_dir.path().to_path_buf()]);
        assert_eq!(outcome.files.len(), 5);
    }

    #[test]
    fn test_filters_apply_to_relative_paths() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        populate(temp_dir.path());
        let filters = FilterRules {
            enable_hidden_files: false,
            exclude: ExcludeRules {
                patterns: vec!["nested/**".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        }
        .compile()
        .expect("Valid filters");

        let outcome = Scanner::new(ScanOptions::default())
            .with_filters(&filters)
            .scan(&[temp_dir.path().to_path_buf()]);
        assert_eq!(
            outcome.files,
            vec![temp_dir.path().join("a.txt"), temp_dir.path().join("b.txt")]
        );
    }

    #[test]
    fn test_missing_root_is_a_warning() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let outcome =
            Scanner::new(ScanOptions::default()).scan(&[temp_dir.path().join("missing")]);
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
    }
}
