//! Settings for file-sorter.
//!
//! Settings are read from one TOML file. Every section is optional:
//!
//! ```toml
//! [relocation]
//! journal_dir = "/var/lib/file-sorter/journals"
//! algorithm = "sha256"          # sha256 | sha512 | blake3
//! sample_size = 65536
//! chunk_size = 1048576
//! validate_full = true
//! strict_rollback = true
//!
//! [naming]
//! pattern = "{parent}_{date}_{stem}{ext}"
//! include_parent = true
//! date_from_mtime = true
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [classification]
//! fallback_category = "Other"
//!
//! [classification.rules.Pictures]
//! extensions = [".jpg", ".png"]
//! mimetypes = ["image/jpeg"]
//!
//! [renamers.rule]
//! enabled = true
//! rules = [{ pattern = "^IMG_(\\d+)$", replace = "photo-$1" }]
//!
//! [renamers.metadata]
//! enabled = false
//! pattern = "{year}-{month}-{day}_{kind}"
//! extensions = ["jpg"]
//! ```

use crate::classifier::ClassificationConfig;
use crate::hasher::{DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_SIZE, HashAlgorithm, HasherConfig};
use crate::namer::NamingOptions;
use crate::renamer::RenamersConfig;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "FILE_SORTER_CONFIG";
const LOCAL_CONFIG: &str = ".file-sorter.toml";
const STATE_DIR: &str = ".file-sorter";

/// Errors that can occur during configuration loading and filter compilation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration in {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("IO error reading configuration {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The complete, deserialized configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub relocation: RelocationConfig,
    #[serde(default)]
    pub naming: NamingOptions,
    #[serde(default)]
    pub filters: FilterRules,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub renamers: RenamersConfig,
}

/// `[relocation]` settings shared by the relocator, rollback and duplicate finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationConfig {
    /// Where journals are written when no explicit path is given.
    #[serde(default)]
    pub journal_dir: Option<PathBuf>,
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    #[serde(default = "default_sample_size")]
    pub sample_size: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_true")]
    pub validate_full: bool,
    #[serde(default = "default_true")]
    pub strict_rollback: bool,
}

fn default_sample_size() -> u64 {
    DEFAULT_SAMPLE_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            journal_dir: None,
            algorithm: HashAlgorithm::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            validate_full: true,
            strict_rollback: true,
        }
    }
}

impl RelocationConfig {
    pub fn hasher_config(&self) -> HasherConfig {
        HasherConfig {
            algorithm: self.algorithm,
            sample_size: self.sample_size,
            chunk_size: self.chunk_size,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. the file named by `$FILE_SORTER_CONFIG`
    /// 3. `.file-sorter.toml` in the current directory
    /// 4. `~/.config/file-sorter/config.toml`
    /// 5. built-in defaults
    ///
    /// A missing `journal_dir` is resolved to `~/.file-sorter/journals`.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file (argument or environment)
    /// is missing or unreadable, or if any file found fails to parse.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match Self::locate(config_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        if settings.relocation.journal_dir.is_none() {
            settings.relocation.journal_dir = Some(default_state_dir().join("journals"));
        }
        Ok(settings)
    }

    fn locate(config_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }

        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = home_dir()?
            .join(".config")
            .join("file-sorter")
            .join("config.toml");
        home_config.exists().then_some(home_config)
    }

    /// Load settings from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file does not exist,
    /// `ConfigError::ConfigInvalid` if TOML parsing fails and
    /// `ConfigError::IoError` if the file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = Self::from_toml_str(&content).map_err(|reason| {
            ConfigError::ConfigInvalid {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        debug!(config = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// The journal directory, or the default one if it was never resolved.
    pub fn journal_dir(&self) -> PathBuf {
        self.relocation
            .journal_dir
            .clone()
            .unwrap_or_else(|| default_state_dir().join("journals"))
    }

    /// Directory for the rolling log file.
    pub fn log_dir(&self) -> PathBuf {
        default_state_dir()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn default_state_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR)
}

/// `[filters]`: which scanned files are eligible for sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist, overrides exclude rules.
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the path relative to the scan root.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Extensions without the dot, case-insensitive.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regexes matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl FilterRules {
    /// Compile the rules once for repeated matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob pattern is invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        let exclude_regexes = self
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledFilters {
            enable_hidden_files: self.enable_hidden_files,
            exclude_filenames: self.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: self
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&self.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&self.include.patterns)?,
        })
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

/// Filter rules with every pattern pre-compiled.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    /// Whether a file takes part in sorting.
    ///
    /// Checked in order, first decision wins:
    /// 1. include pattern match: include
    /// 2. hidden file while hidden files are disabled: exclude
    /// 3. exact filename, extension, glob or regex match: exclude
    /// 4. otherwise include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn excluding(exclude: ExcludeRules) -> CompiledFilters {
        FilterRules {
            enable_hidden_files: true,
            exclude,
            include: IncludeRules::default(),
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.relocation.algorithm, HashAlgorithm::Sha256);
        assert_eq!(settings.relocation.sample_size, 65536);
        assert!(settings.relocation.validate_full);
        assert!(settings.relocation.strict_rollback);
        assert_eq!(settings.naming, NamingOptions::default());
        assert_eq!(settings.classification.fallback_category, "Other");
        assert!(!settings.renamers.rule.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [relocation]
            algorithm = "blake3"
            strict_rollback = false

            [naming]
            include_parent = false

            [renamers.rule]
            enabled = true
            rules = [{ pattern = "^IMG_", replace = "photo_" }]
            "#,
        )
        .unwrap();

        assert_eq!(settings.relocation.algorithm, HashAlgorithm::Blake3);
        assert!(!settings.relocation.strict_rollback);
        assert_eq!(settings.relocation.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!settings.naming.include_parent);
        assert_eq!(settings.naming.pattern, crate::namer::DEFAULT_PATTERN);
        assert_eq!(settings.renamers.rule.rules.len(), 1);
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let result = Settings::from_toml_str("[relocation]\nalgorithm = \"md5\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = Settings::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_explicit_file_resolves_journal_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        let journals = temp_dir.path().join("journals");
        fs::write(
            &path,
            format!("[relocation]\njournal_dir = {:?}\n", journals.display().to_string()),
        )
        .expect("Failed to write config");

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.journal_dir(), journals);
    }

    #[test]
    fn test_invalid_toml_names_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[relocation\n").expect("Failed to write config");

        let result = Settings::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = FilterRules::default().compile().unwrap();

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(compiled.should_include(Path::new("photo.jpg")));
    }

    #[test]
    fn test_exclude_filename_and_extension() {
        let compiled = excluding(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            extensions: vec!["bak".to_string(), ".tmp".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(!compiled.should_include(Path::new("file.tmp")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_glob_pattern_directory_boundary_semantics() {
        let compiled = excluding(ExcludeRules {
            patterns: vec!["**/logs/**".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("logs/file.txt")));
        assert!(!compiled.should_include(Path::new("app/logs/file.txt")));
        assert!(compiled.should_include(Path::new("my_logs/file.txt")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = excluding(ExcludeRules {
            regex: vec![r"^test_.*\.txt$".to_string()],
            ..Default::default()
        });

        assert!(!compiled.should_include(Path::new("test_file.txt")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = FilterRules {
            enable_hidden_files: false,
            exclude: ExcludeRules::default(),
            include: IncludeRules {
                patterns: vec![".important".to_string()],
            },
        }
        .compile()
        .unwrap();

        assert!(compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_invalid_patterns_return_errors() {
        let bad_regex = FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_regex.compile(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            bad_glob.compile(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
