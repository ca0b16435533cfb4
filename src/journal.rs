/// Append-only relocation journal.
///
/// Each planned move is written as one self-contained JSON object per line
/// before the move happens:
///
/// ```text
/// {"src":"/in/a.txt","dst":"/out/a.txt","sha256":"…","size":4,"epoch":1700000000}
/// ```
///
/// The digest field is named after the algorithm that produced it, so records
/// written with different algorithms are never compared against each other.
/// Lines are parsed independently: one bad line is reported with its number
/// and content instead of being skipped.
use crate::error::{RelocationError, RelocationResult};
use crate::hasher::{ContentDigest, HashAlgorithm};
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const JOURNAL_PREFIX: &str = "file-sort-log_";
const JOURNAL_EXTENSION: &str = "jsonl";

/// One journaled move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Digest of the source content taken right before the move.
    pub digest: ContentDigest,
    pub size_bytes: u64,
    /// Seconds since the Unix epoch when the entry was written.
    pub epoch: i64,
}

impl JournalEntry {
    pub fn new(
        source: PathBuf,
        destination: PathBuf,
        digest: ContentDigest,
        size_bytes: u64,
    ) -> Self {
        Self {
            source,
            destination,
            digest,
            size_bytes,
            epoch: Utc::now().timestamp(),
        }
    }

    /// Serializes the entry as a single JSON line (without the newline).
    pub fn to_line(&self) -> String {
        let mut record = Map::new();
        record.insert(
            "src".to_string(),
            json!(self.source.to_string_lossy().to_string()),
        );
        record.insert(
            "dst".to_string(),
            json!(self.destination.to_string_lossy().to_string()),
        );
        record.insert(
            self.digest.algorithm.name().to_string(),
            json!(self.digest.hex),
        );
        record.insert("size".to_string(), json!(self.size_bytes));
        record.insert("epoch".to_string(), json!(self.epoch));
        Value::Object(record).to_string()
    }

    /// Parses one journal line. The error string explains what is wrong.
    pub fn from_line(line: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| format!("JSON parse error: {}", e))?;
        let record = value
            .as_object()
            .ok_or_else(|| "record is not a JSON object".to_string())?;

        let text_field = |name: &str| {
            record
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| format!("missing or invalid '{}' field", name))
        };

        let source = text_field("src")?;
        let destination = text_field("dst")?;

        let mut digests = HashAlgorithm::ALL
            .into_iter()
            .filter_map(|algorithm| record.get(algorithm.name()).map(|v| (algorithm, v)));
        let (algorithm, hex) = match (digests.next(), digests.next()) {
            (Some((algorithm, value)), None) => (
                algorithm,
                value
                    .as_str()
                    .ok_or_else(|| format!("'{}' field is not a string", algorithm))?,
            ),
            (None, _) => return Err("no digest field found".to_string()),
            (Some(_), Some(_)) => return Err("more than one digest field".to_string()),
        };
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' field is not a hex digest", algorithm));
        }

        let size_bytes = record
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| "missing or invalid 'size' field".to_string())?;
        let epoch = record
            .get("epoch")
            .and_then(Value::as_i64)
            .ok_or_else(|| "missing or invalid 'epoch' field".to_string())?;

        Ok(Self {
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
            digest: ContentDigest::new(algorithm, hex.to_ascii_lowercase()),
            size_bytes,
            epoch,
        })
    }
}

/// An open journal accepting new entries.
#[derive(Debug)]
pub struct RelocationJournal {
    path: PathBuf,
    file: File,
}

impl RelocationJournal {
    /// Creates a new journal.
    ///
    /// With an explicit `path` the file must not exist yet. Without one, a
    /// time-derived name inside `journal_dir` is used, adding `-2`, `-3`, …
    /// if that name is already taken.
    pub fn open(path: Option<&Path>, journal_dir: &Path) -> RelocationResult<Self> {
        match path {
            Some(path) => Self::create_new(path),
            None => {
                let stem = format!(
                    "{}{}",
                    JOURNAL_PREFIX,
                    chrono::Local::now().format("%Y%m%d_%H%M%S_%6f")
                );
                let mut attempt = 1;
                loop {
                    let name = if attempt == 1 {
                        format!("{}.{}", stem, JOURNAL_EXTENSION)
                    } else {
                        format!("{}-{}.{}", stem, attempt, JOURNAL_EXTENSION)
                    };
                    match Self::create_new(&journal_dir.join(name)) {
                        Err(RelocationError::JournalWriteFailed { source, .. })
                            if source.kind() == ErrorKind::AlreadyExists =>
                        {
                            attempt += 1;
                        }
                        other => return other,
                    }
                }
            }
        }
    }

    fn create_new(path: &Path) -> RelocationResult<Self> {
        let write_failed = |source| RelocationError::JournalWriteFailed {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(path)
            .map_err(write_failed)?;
        let path = std::path::absolute(path).map_err(write_failed)?;
        debug!(journal = %path.display(), "Journal created");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record and syncs it to disk before returning.
    pub fn append(&mut self, entry: &JournalEntry) -> RelocationResult<()> {
        let mut line = entry.to_line();
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data())
            .map_err(|e| RelocationError::JournalWriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }

    /// Reads every entry of a journal in file order.
    ///
    /// Blank lines are ignored; any other line that does not parse aborts the
    /// read with [`RelocationError::MalformedJournalRecord`].
    pub fn read_all(path: &Path) -> RelocationResult<Vec<JournalEntry>> {
        Self::read_numbered(path).map(|entries| entries.into_iter().map(|(_, e)| e).collect())
    }

    /// Reads every entry together with its 1-based line number.
    pub(crate) fn read_numbered(path: &Path) -> RelocationResult<Vec<(usize, JournalEntry)>> {
        let read_failed = |source| RelocationError::JournalReadFailed {
            path: path.to_path_buf(),
            source,
        };
        let bytes = fs::read(path).map_err(read_failed)?;
        let mut entries = Vec::new();
        for (index, raw) in bytes.split(|byte| *byte == b'\n').enumerate() {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let malformed = |reason: String| RelocationError::MalformedJournalRecord {
                journal: path.to_path_buf(),
                line: index + 1,
                content: String::from_utf8_lossy(raw).into_owned(),
                reason,
            };

            // Invalid UTF-8 is reported like any other unparsable line.
            let line = std::str::from_utf8(raw)
                .map_err(|e| malformed(format!("invalid UTF-8: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = JournalEntry::from_line(line).map_err(&malformed)?;
            entries.push((index + 1, entry));
        }
        Ok(entries)
    }
}
