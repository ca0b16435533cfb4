//! Move plans: ordered lists of source → destination pairs.

use crate::error::{RelocationError, RelocationResult};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A single planned move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Category label supplied by the classifier, if any. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PlannedMove {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// An ordered move plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovePlan {
    pub entries: Vec<PlannedMove>,
    /// Inputs the planner dropped because they vanished or could not be named.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<(PathBuf, String)>,
}

impl MovePlan {
    pub fn new(entries: Vec<PlannedMove>) -> Self {
        Self {
            entries,
            skipped: Vec::new(),
        }
    }

    /// Builds a plan from bare `(source, destination)` pairs.
    pub fn from_pairs<I, S, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(source, destination)| PlannedMove::new(source, destination))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the plan's structural invariants without touching the disk.
    ///
    /// - every path is absolute and valid UTF-8, so the journal can record it
    /// - source paths are unique
    /// - destination paths are unique, compared case-insensitively
    pub fn validate(&self) -> RelocationResult<()> {
        let mut sources = HashSet::new();
        let mut destinations = HashSet::new();

        for entry in &self.entries {
            for path in [&entry.source, &entry.destination] {
                check_representable(path)?;
            }
            if !sources.insert(entry.source.as_path()) {
                return Err(RelocationError::InvalidPlan {
                    reason: format!("source {} appears more than once", entry.source.display()),
                });
            }
            if !destinations.insert(fold_case(&entry.destination)) {
                return Err(RelocationError::DestinationCollision {
                    path: entry.destination.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_representable(path: &Path) -> RelocationResult<()> {
    if path.to_str().is_none() {
        return Err(RelocationError::InvalidPlan {
            reason: format!("path {} is not valid UTF-8", path.display()),
        });
    }
    if !path.is_absolute() {
        return Err(RelocationError::InvalidPlan {
            reason: format!("path {} is not absolute", path.display()),
        });
    }
    if path.file_name().is_none() {
        return Err(RelocationError::InvalidPlan {
            reason: format!("path {} has no file name", path.display()),
        });
    }
    Ok(())
}

fn fold_case(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}
