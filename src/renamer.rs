//! Pluggable stem renamers.
//!
//! A renamer looks at a source file and either proposes a new stem or has no
//! opinion. [`RenamerChain`] asks each renamer in priority order (rule-based,
//! metadata-based, default) and the first proposal wins. The proposal is
//! handed to [`DestinationNamer`](crate::namer::DestinationNamer), which stays
//! unaware of how it was produced.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use exif::{In, Tag, Value};
use id3::TagLike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

/// Bytes read from the start of a file to detect its kind.
const SIGNATURE_BYTES: u64 = 8192;

/// Proposes a replacement stem for a source file.
pub trait Renamer {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Returns `Some(stem)` to rename, `None` for no opinion.
    fn propose_stem(&self, source: &Path) -> Option<String>;
}

/// A single regex substitution applied to a file stem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub pattern: String,
    pub replace: String,
}

/// `[renamers.rule]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRenamerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<RenameRule>,
}

/// `[renamers.metadata]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRenamerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tokens: `{year} {month} {day} {hour} {minute} {second} {kind}`, the
    /// EXIF camera tokens `{make} {model}` and the ID3 tokens
    /// `{artist} {album} {title} {track} {genre}`.
    #[serde(default)]
    pub pattern: String,
    /// Lower-case extensions (without dot) this renamer applies to. Empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// `[renamers]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamersConfig {
    #[serde(default)]
    pub rule: RuleRenamerConfig,
    #[serde(default)]
    pub metadata: MetadataRenamerConfig,
}

/// Rewrites stems that match a configured regex.
pub struct RuleRenamer {
    rules: Vec<(Regex, String)>,
}

impl RuleRenamer {
    pub fn new(rules: &[RenameRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((Regex::new(&rule.pattern)?, rule.replace.clone())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }
}

impl Renamer for RuleRenamer {
    fn name(&self) -> &str {
        "rule"
    }

    fn propose_stem(&self, source: &Path) -> Option<String> {
        let stem = source.file_stem()?.to_str()?;
        self.rules.iter().find_map(|(regex, replace)| {
            if !regex.is_match(stem) {
                return None;
            }
            let renamed = regex.replace(stem, replace.as_str()).trim().to_string();
            (!renamed.is_empty()).then_some(renamed)
        })
    }
}

/// Builds stems from embedded photo and audio metadata.
///
/// Timestamp tokens come from EXIF `DateTimeOriginal` when the file carries
/// it, else from the modification time. `{make}` and `{model}` need an EXIF
/// block and audio tokens need an ID3 tag; without them the renamer has no
/// opinion.
pub struct MetadataRenamer {
    pattern: String,
    extensions: Vec<String>,
}

const TIME_TOKENS: [&str; 6] = [
    "{year}", "{month}", "{day}", "{hour}", "{minute}", "{second}",
];
const CAMERA_TOKENS: [&str; 2] = ["{make}", "{model}"];
const AUDIO_TOKENS: [&str; 5] = ["{artist}", "{album}", "{title}", "{track}", "{genre}"];

/// Fields read from a photo's EXIF block.
#[derive(Debug)]
struct ExifFields {
    taken: Option<NaiveDateTime>,
    make: Option<String>,
    model: Option<String>,
}

/// Fields read from an audio file's ID3 tag, with placeholders for gaps.
#[derive(Debug)]
struct AudioFields {
    artist: String,
    album: String,
    title: String,
    track: u32,
    genre: String,
}

impl MetadataRenamer {
    pub fn new(config: &MetadataRenamerConfig) -> Self {
        Self {
            pattern: config.pattern.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    fn applies_to(&self, source: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        source
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn uses_any(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|token| self.pattern.contains(token))
    }

    fn detect_kind(source: &Path) -> std::io::Result<Option<&'static str>> {
        let mut head = Vec::new();
        File::open(source)?
            .take(SIGNATURE_BYTES)
            .read_to_end(&mut head)?;
        Ok(infer::get(&head).map(|kind| kind.extension()))
    }
}

fn read_exif(source: &Path) -> Option<ExifFields> {
    let file = match File::open(source) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %source.display(), error = %e, "Cannot open file for EXIF");
            return None;
        }
    };
    let data = match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %source.display(), error = %e, "No EXIF data");
            return None;
        }
    };

    let ascii = |tag: Tag| match data.get_field(tag, In::PRIMARY).map(|field| &field.value) {
        Some(Value::Ascii(values)) => values
            .first()
            .map(|bytes| {
                String::from_utf8_lossy(bytes)
                    .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .to_string()
            })
            .filter(|text| !text.is_empty()),
        _ => None,
    };

    let taken = match data
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .map(|field| &field.value)
    {
        Some(Value::Ascii(values)) => values
            .first()
            .and_then(|bytes| exif::DateTime::from_ascii(bytes).ok())
            .and_then(|dt| {
                NaiveDate::from_ymd_opt(i32::from(dt.year), dt.month.into(), dt.day.into())?
                    .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())
            }),
        _ => None,
    };

    Some(ExifFields {
        taken,
        make: ascii(Tag::Make),
        model: ascii(Tag::Model),
    })
}

fn read_audio(source: &Path) -> Option<AudioFields> {
    let tag = match id3::Tag::read_from_path(source) {
        Ok(tag) => tag,
        Err(e) => {
            warn!(path = %source.display(), error = %e, "Failed to read audio tags");
            return None;
        }
    };
    let text = |value: Option<&str>, fallback: &str| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Some(AudioFields {
        artist: text(tag.artist(), "Unknown Artist"),
        album: text(tag.album(), "Unknown Album"),
        title: text(tag.title(), &stem),
        track: tag.track().unwrap_or(0),
        genre: text(tag.genre(), "Unknown Genre"),
    })
}

fn modification_time(source: &Path) -> Option<NaiveDateTime> {
    match std::fs::metadata(source).and_then(|m| m.modified()) {
        Ok(modified) => Some(DateTime::<Local>::from(modified).naive_local()),
        Err(e) => {
            warn!(path = %source.display(), error = %e, "Cannot read timestamps");
            None
        }
    }
}

impl Renamer for MetadataRenamer {
    fn name(&self) -> &str {
        "metadata"
    }

    fn propose_stem(&self, source: &Path) -> Option<String> {
        if self.pattern.is_empty() || !self.applies_to(source) {
            return None;
        }
        let mut values: Vec<(&str, String)> = Vec::new();

        if self.uses_any(&AUDIO_TOKENS) {
            let audio = read_audio(source)?;
            values.extend([
                ("{artist}", audio.artist),
                ("{album}", audio.album),
                ("{title}", audio.title),
                ("{track}", format!("{:02}", audio.track)),
                ("{genre}", audio.genre),
            ]);
        }

        let uses_camera = self.uses_any(&CAMERA_TOKENS);
        let uses_time = self.uses_any(&TIME_TOKENS);
        let camera = if uses_camera || uses_time {
            read_exif(source)
        } else {
            None
        };

        if uses_camera {
            let fields = camera.as_ref()?;
            values.extend([
                (
                    "{make}",
                    fields.make.clone().unwrap_or_else(|| "UnknownMake".to_string()),
                ),
                (
                    "{model}",
                    fields
                        .model
                        .clone()
                        .unwrap_or_else(|| "UnknownModel".to_string()),
                ),
            ]);
        }

        if uses_time {
            let taken = match camera.and_then(|fields| fields.taken) {
                Some(taken) => taken,
                None => modification_time(source)?,
            };
            values.extend([
                ("{year}", taken.format("%Y").to_string()),
                ("{month}", taken.format("%m").to_string()),
                ("{day}", taken.format("%d").to_string()),
                ("{hour}", taken.format("%H").to_string()),
                ("{minute}", taken.format("%M").to_string()),
                ("{second}", taken.format("%S").to_string()),
            ]);
        }

        if self.pattern.contains("{kind}") {
            match Self::detect_kind(source) {
                Ok(Some(kind)) => values.push(("{kind}", kind.to_string())),
                Ok(None) => return None,
                Err(e) => {
                    warn!(path = %source.display(), error = %e, "Cannot read file signature");
                    return None;
                }
            }
        }

        let stem = values
            .iter()
            .fold(self.pattern.clone(), |stem, (token, value)| {
                stem.replace(*token, value)
            });
        Some(stem)
    }
}

/// Never has an opinion; terminates the chain.
pub struct DefaultRenamer;

impl Renamer for DefaultRenamer {
    fn name(&self) -> &str {
        "default"
    }

    fn propose_stem(&self, _source: &Path) -> Option<String> {
        None
    }
}

/// Ordered set of renamers.
pub struct RenamerChain {
    renamers: Vec<Box<dyn Renamer>>,
}

impl RenamerChain {
    pub fn new(renamers: Vec<Box<dyn Renamer>>) -> Self {
        Self { renamers }
    }

    /// Builds the chain from configuration: rule, then metadata, then default.
    pub fn from_config(config: &RenamersConfig) -> Result<Self, regex::Error> {
        let mut renamers: Vec<Box<dyn Renamer>> = Vec::new();
        if config.rule.enabled {
            renamers.push(Box::new(RuleRenamer::new(&config.rule.rules)?));
        }
        if config.metadata.enabled {
            renamers.push(Box::new(MetadataRenamer::new(&config.metadata)));
        }
        renamers.push(Box::new(DefaultRenamer));
        Ok(Self { renamers })
    }

    /// The first proposal in priority order, if any.
    pub fn propose_stem(&self, source: &Path) -> Option<String> {
        self.renamers.iter().find_map(|renamer| {
            let proposal = renamer.propose_stem(source)?;
            debug!(renamer = renamer.name(), path = %source.display(), stem = %proposal, "Renamer proposed stem");
            Some(proposal)
        })
    }
}

impl Default for RenamerChain {
    fn default() -> Self {
        Self::new(vec![Box::new(DefaultRenamer)])
    }
}
