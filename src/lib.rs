//! file-sorter - sort files into a destination tree with reversible moves
//!
//! The relocation core hashes file content, finds duplicates, names
//! destinations without collisions, and executes moves behind an append-only
//! journal that a later rollback can replay in reverse. Scanning,
//! classification, configuration and console output surround that core for
//! the command-line tool.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod hasher;
pub mod journal;
pub mod logging;
pub mod namer;
pub mod output;
pub mod plan;
pub mod planner;
pub mod relocator;
pub mod renamer;
pub mod rollback;
pub mod scanner;

pub use classifier::{ClassificationConfig, Classifier};
pub use config::{CompiledFilters, ConfigError, FilterRules, RelocationConfig, Settings};
pub use duplicates::{
    DuplicateFinder, DuplicateGroup, DuplicateScan, UnreadablePolicy, delete_older_copies,
};
pub use error::{RelocationError, RelocationResult};
pub use hasher::{ContentDigest, ContentHasher, HashAlgorithm, HasherConfig};
pub use journal::{JournalEntry, RelocationJournal};
pub use namer::{DestinationNamer, NamingOptions};
pub use plan::{MovePlan, PlannedMove};
pub use planner::{Assignment, Planner};
pub use relocator::{ProgressObserver, Relocator};
pub use renamer::{Renamer, RenamerChain};
pub use rollback::{RollbackEngine, RollbackReport};
pub use scanner::{ScanOptions, Scanner};

pub use cli::{Command, run};
