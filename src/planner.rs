//! Turns per-file target directories into a [`MovePlan`].

use crate::error::{RelocationError, RelocationResult};
use crate::namer::DestinationNamer;
use crate::plan::{MovePlan, PlannedMove};
use crate::renamer::RenamerChain;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A source file and the directory it should end up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub source: PathBuf,
    pub target_dir: PathBuf,
    pub category: Option<String>,
}

impl Assignment {
    pub fn new(source: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Builds move plans with a namer and a renamer chain.
pub struct Planner {
    namer: DestinationNamer,
    renamers: RenamerChain,
}

impl Planner {
    pub fn new(namer: DestinationNamer, renamers: RenamerChain) -> Self {
        Self { namer, renamers }
    }

    /// Names a destination for every assignment.
    ///
    /// Names handed out earlier in the same plan count as taken, so two
    /// sources never share a destination. Repeated sources are planned once.
    /// Sources that no longer exist go to [`MovePlan::skipped`].
    pub fn plan(&self, assignments: &[Assignment]) -> RelocationResult<MovePlan> {
        let mut plan = MovePlan::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut reserved: HashMap<PathBuf, HashSet<String>> = HashMap::new();

        for assignment in assignments {
            let source = std::path::absolute(&assignment.source)
                .map_err(|e| RelocationError::file_system(&assignment.source, e))?;
            if !seen.insert(source.clone()) {
                debug!(source = %source.display(), "Repeated source, planned once");
                continue;
            }

            if let Err(reason) = check_source(&source)? {
                warn!(source = %source.display(), reason, "Skipping source");
                plan.skipped.push((source, reason.to_string()));
                continue;
            }

            let target_dir = std::path::absolute(&assignment.target_dir)
                .map_err(|e| RelocationError::file_system(&assignment.target_dir, e))?;
            let taken = reserved.entry(target_dir.clone()).or_default();
            let stem = self.renamers.propose_stem(&source);
            let destination = self
                .namer
                .name_with(&source, &target_dir, stem.as_deref(), taken)?;

            if let Some(name) = destination.file_name() {
                taken.insert(name.to_string_lossy().to_lowercase());
            }

            let mut entry = PlannedMove::new(source, destination);
            entry.category = assignment.category.clone();
            plan.entries.push(entry);
        }

        debug!(
            planned = plan.entries.len(),
            skipped = plan.skipped.len(),
            "Plan built"
        );
        Ok(plan)
    }
}

/// `Ok(Err(reason))` when the source should be skipped rather than failing the plan.
fn check_source(source: &Path) -> RelocationResult<Result<(), &'static str>> {
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_file() => Ok(Ok(())),
        Ok(_) => Ok(Err("not a regular file")),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Err("source vanished")),
        Err(e) => Err(RelocationError::file_system(source, e)),
    }
}
