//! Collision-free destination naming.
//!
//! A pattern such as `{parent}_{date}_{stem}{ext}` is rendered for each source
//! file. Tokens that resolve to nothing are dropped together with the
//! separator next to them, so `{parent}_{date}_{stem}` becomes `2024-01-31_notes`
//! when the parent is omitted.
//!
//! Collision avoidance lists the target directory once per call and compares
//! names case-insensitively. This is check-then-use: another process creating
//! the same name between this call and the move is not guarded against.

use crate::error::{RelocationError, RelocationResult};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Pattern used when none is configured.
pub const DEFAULT_PATTERN: &str = "{parent}_{date}_{stem}{ext}";

const DATE_FORMAT: &str = "%Y-%m-%d";
const FALLBACK_STEM: &str = "file";

/// Options controlling how destination names are composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingOptions {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_true")]
    pub include_parent: bool,
    /// Take `{date}` from the source's modification time instead of today.
    #[serde(default = "default_true")]
    pub date_from_mtime: bool,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            include_parent: true,
            date_from_mtime: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Parent,
    Date,
    Stem,
    Ext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// Produces unique destination paths inside a target directory.
#[derive(Debug, Clone)]
pub struct DestinationNamer {
    options: NamingOptions,
    segments: Vec<Segment>,
}

impl DestinationNamer {
    /// Parses the pattern up front so bad patterns fail before any naming.
    pub fn new(options: NamingOptions) -> RelocationResult<Self> {
        let segments = parse_pattern(&options.pattern)?;
        Ok(Self { options, segments })
    }

    pub fn options(&self) -> &NamingOptions {
        &self.options
    }

    /// Returns an absolute path in `target_dir` that does not collide with any
    /// entry currently in that directory.
    pub fn name(&self, source: &Path, target_dir: &Path) -> RelocationResult<PathBuf> {
        self.name_with(source, target_dir, None, &HashSet::new())
    }

    /// Like [`name`](Self::name), with an optional stem proposed by a renamer
    /// and a set of lower-cased file names already claimed in `target_dir`.
    ///
    /// A proposed stem replaces `{stem}` and suppresses `{parent}`.
    pub fn name_with(
        &self,
        source: &Path,
        target_dir: &Path,
        proposed_stem: Option<&str>,
        reserved: &HashSet<String>,
    ) -> RelocationResult<PathBuf> {
        let target_dir = std::path::absolute(target_dir)
            .map_err(|e| RelocationError::file_system(target_dir, e))?;

        let stem = self.render_stem(source, proposed_stem)?;
        let ext = if self.segments.contains(&Segment::Token(Token::Ext)) {
            extension_of(source)
        } else {
            String::new()
        };

        let mut taken = existing_names(&target_dir)?;
        taken.extend(reserved.iter().cloned());

        let mut candidate = format!("{}{}", stem, ext);
        let mut counter = 2;
        while taken.contains(&candidate.to_lowercase()) {
            candidate = format!("{}__{}{}", stem, counter, ext);
            counter += 1;
        }
        Ok(target_dir.join(candidate))
    }

    fn render_stem(&self, source: &Path, proposed_stem: Option<&str>) -> RelocationResult<String> {
        let mut pieces: Vec<(bool, String)> = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pieces.push((false, text.clone())),
                Segment::Token(Token::Ext) => {}
                Segment::Token(token) => {
                    let value = self.token_value(*token, source, proposed_stem)?;
                    if !value.is_empty() {
                        pieces.push((true, value));
                    }
                }
            }
        }

        // Separator-only literals survive only between two emitted values.
        let mut stem = String::new();
        let mut pending_separator: Option<&str> = None;
        let mut emitted_any = false;
        for (is_value, text) in &pieces {
            if *is_value || !is_separator(text) {
                if let Some(sep) = pending_separator.take()
                    && emitted_any
                {
                    stem.push_str(sep);
                }
                stem.push_str(text);
                emitted_any = true;
            } else if pending_separator.is_none() {
                pending_separator = Some(text);
            }
        }

        if stem.is_empty() {
            stem.push_str(FALLBACK_STEM);
        }
        Ok(stem)
    }

    fn token_value(
        &self,
        token: Token,
        source: &Path,
        proposed_stem: Option<&str>,
    ) -> RelocationResult<String> {
        let value = match token {
            Token::Parent => {
                if !self.options.include_parent || proposed_stem.is_some() {
                    String::new()
                } else {
                    meaningful_parent(source).map(slugify).unwrap_or_default()
                }
            }
            Token::Date => {
                let date = if self.options.date_from_mtime {
                    modification_date(source)?
                } else {
                    Local::now().date_naive()
                };
                date.format(DATE_FORMAT).to_string()
            }
            Token::Stem => {
                let raw = proposed_stem.map(str::to_string).unwrap_or_else(|| {
                    source
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                let slug = slugify(&raw);
                if slug.is_empty() {
                    FALLBACK_STEM.to_string()
                } else {
                    slug
                }
            }
            Token::Ext => extension_of(source),
        };
        Ok(value)
    }
}

impl Default for DestinationNamer {
    fn default() -> Self {
        Self {
            options: NamingOptions::default(),
            segments: parse_pattern(DEFAULT_PATTERN).unwrap_or_default(),
        }
    }
}

/// Lower-cases `text` and collapses every run of non-alphanumeric characters
/// into a single `-`, trimming separators at both ends.
///
/// Uses Unicode character classes only, so the result never depends on locale.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn parse_pattern(pattern: &str) -> RelocationResult<Vec<Segment>> {
    let invalid = |reason: &str| RelocationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(invalid("unclosed '{'"));
                }
                let token = match name.as_str() {
                    "parent" => Token::Parent,
                    "date" => Token::Date,
                    "stem" => Token::Stem,
                    "ext" => Token::Ext,
                    other => return Err(invalid(&format!("unknown token '{{{}}}'", other))),
                };
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Token(token));
            }
            '}' => return Err(invalid("unmatched '}'")),
            '/' | '\\' => return Err(invalid("path separators are not allowed")),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    if !segments.iter().any(|s| matches!(s, Segment::Token(_))) {
        return Err(invalid("pattern must contain at least one token"));
    }
    Ok(segments)
}

fn is_separator(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| matches!(c, '_' | '-' | '.' | ' '))
}

fn meaningful_parent(source: &Path) -> Option<&str> {
    let parent = source.parent()?;
    match parent.components().next_back() {
        Some(Component::Normal(name)) => name.to_str(),
        _ => None,
    }
}

fn extension_of(source: &Path) -> String {
    source
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn modification_date(source: &Path) -> RelocationResult<NaiveDate> {
    let modified = fs::metadata(source)
        .and_then(|m| m.modified())
        .map_err(|e| RelocationError::file_system(source, e))?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

fn existing_names(dir: &Path) -> RelocationResult<HashSet<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(RelocationError::file_system(dir, e)),
    };
    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| RelocationError::file_system(dir, e))?;
        names.insert(entry.file_name().to_string_lossy().to_lowercase());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn set_local_date(path: &Path, year: i32, month: u32, day: u32) {
        let stamp = Local
            .with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .expect("Unambiguous local time");
        let file = File::options()
            .write(true)
            .open(path)
            .expect("Failed to open file");
        file.set_modified(SystemTime::from(stamp))
            .expect("Failed to set mtime");
    }

    fn source_in(dir: &Path, parent: &str, name: &str) -> PathBuf {
        let parent_dir = dir.join(parent);
        fs::create_dir_all(&parent_dir).expect("Failed to create parent");
        let path = parent_dir.join(name);
        fs::write(&path, "content").expect("Failed to write source");
        set_local_date(&path, 2000, 1, 1);
        path
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Example File"), "example-file");
        assert_eq!(slugify("  --Hello,   World!--  "), "hello-world");
        assert_eq!(slugify("photo (1)"), "photo-1");
        assert_eq!(slugify("Ünïcode Straße"), "ünïcode-straße");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_default_pattern_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "proj", "Example File.TXT");
        let out = temp_dir.path().join("out");

        let path = DestinationNamer::default()
            .name(&source, &out)
            .expect("Naming failed");

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("proj_2000-01-01_example-file"));
        assert_eq!(name, "proj_2000-01-01_example-file.txt");
        assert!(path.starts_with(&out));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_name_is_idempotent_on_empty_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "a.txt");
        let out = temp_dir.path().join("out");
        fs::create_dir(&out).expect("Failed to create out");
        let namer = DestinationNamer::default();

        let first = namer.name(&source, &out).expect("Naming failed");
        let second = namer.name(&source, &out).expect("Naming failed");
        assert_eq!(first, second);
    }

    #[test]
    fn test_collision_appends_counter_case_insensitively() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "a.txt");
        let out = temp_dir.path().join("out");
        fs::create_dir(&out).expect("Failed to create out");
        fs::write(out.join("IN_2000-01-01_A.TXT"), "x").expect("Failed to write");
        fs::write(out.join("in_2000-01-01_a__2.txt"), "x").expect("Failed to write");

        let path = DestinationNamer::default()
            .name(&source, &out)
            .expect("Naming failed");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "in_2000-01-01_a__3.txt"
        );
    }

    #[test]
    fn test_reserved_names_are_avoided() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "a.txt");
        let out = temp_dir.path().join("out");
        let reserved: HashSet<String> = ["in_2000-01-01_a.txt".to_string()].into();

        let path = DestinationNamer::default()
            .name_with(&source, &out, None, &reserved)
            .expect("Naming failed");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "in_2000-01-01_a__2.txt"
        );
    }

    #[test]
    fn test_without_parent_drops_separator() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "Notes.md");
        let namer = DestinationNamer::new(NamingOptions {
            include_parent: false,
            ..NamingOptions::default()
        })
        .expect("Valid pattern");

        let path = namer
            .name(&source, temp_dir.path())
            .expect("Naming failed");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "2000-01-01_notes.md"
        );
    }

    #[test]
    fn test_proposed_stem_replaces_stem_and_parent() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "IMG_0001.JPG");

        let path = DestinationNamer::default()
            .name_with(
                &source,
                temp_dir.path(),
                Some("Canon 2021 Trip"),
                &HashSet::new(),
            )
            .expect("Naming failed");
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "2000-01-01_canon-2021-trip.jpg"
        );
    }

    #[test]
    fn test_today_date_when_not_using_mtime() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "a.txt");
        let namer = DestinationNamer::new(NamingOptions {
            pattern: "{date}{ext}".to_string(),
            include_parent: true,
            date_from_mtime: false,
        })
        .expect("Valid pattern");

        let path = namer
            .name(&source, temp_dir.path())
            .expect("Naming failed");
        let today = Local::now().date_naive().format(DATE_FORMAT).to_string();
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&today)
        );
    }

    #[test]
    fn test_file_without_extension_or_slug() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = source_in(temp_dir.path(), "in", "!!!");
        let namer = DestinationNamer::new(NamingOptions {
            pattern: "{stem}{ext}".to_string(),
            ..NamingOptions::default()
        })
        .expect("Valid pattern");

        let path = namer
            .name(&source, temp_dir.path())
            .expect("Naming failed");
        assert_eq!(path.file_name().unwrap().to_string_lossy(), "file");
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        for pattern in ["{stem", "{nope}{ext}", "stem}", "plain", "{parent}/{stem}"] {
            let result = DestinationNamer::new(NamingOptions {
                pattern: pattern.to_string(),
                ..NamingOptions::default()
            });
            assert!(
                matches!(result, Err(RelocationError::InvalidPattern { .. })),
                "pattern {} should be rejected",
                pattern
            );
        }
    }

    #[test]
    fn test_missing_source_is_reported() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = DestinationNamer::default()
            .name(&temp_dir.path().join("gone.txt"), temp_dir.path());
        assert!(matches!(result, Err(RelocationError::FileSystem { .. })));
    }
}
