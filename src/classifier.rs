/// Category inference for scanned files.
///
/// Maps file extensions and detected MIME types to category labels such as
/// `Pictures` or `Documents`. The label becomes the name of the subdirectory
/// a file is moved into.
///
/// # Examples
///
/// ```
/// use file_sorter::classifier::{ClassificationConfig, Classifier};
///
/// let classifier = Classifier::new(&ClassificationConfig::default());
/// assert_eq!(classifier.categorize(None, Some("PNG")), "Pictures");
/// assert_eq!(classifier.categorize(Some("audio/x-unknown"), None), "Audio");
/// assert_eq!(classifier.categorize(None, None), "Other");
/// ```
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_FALLBACK_CATEGORY: &str = "Other";

/// Extensions and MIME types that select one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub mimetypes: Vec<String>,
}

/// `[classification]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_fallback")]
    pub fallback_category: String,
    /// Category name to rule. Empty means the built-in table.
    #[serde(default)]
    pub rules: BTreeMap<String, CategoryRule>,
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK_CATEGORY.to_string()
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            fallback_category: default_fallback(),
            rules: BTreeMap::new(),
        }
    }
}

/// Resolves a category label for a file.
#[derive(Debug, Clone)]
pub struct Classifier {
    extension_map: HashMap<String, String>,
    mime_map: HashMap<String, String>,
    fallback: String,
}

impl Classifier {
    pub fn new(config: &ClassificationConfig) -> Self {
        let mut classifier = Self {
            extension_map: HashMap::new(),
            mime_map: HashMap::new(),
            fallback: config.fallback_category.clone(),
        };
        if config.rules.is_empty() {
            classifier.populate_standard_mappings();
        } else {
            for (category, rule) in &config.rules {
                classifier.add_rule(category, rule);
            }
        }
        classifier
    }

    fn populate_standard_mappings(&mut self) {
        let table: [(&str, &[&str], &[&str]); 6] = [
            (
                "Pictures",
                &[
                    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic",
                ],
                &["image/svg+xml"],
            ),
            (
                "Audio",
                &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"],
                &[],
            ),
            (
                "Videos",
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
                &[],
            ),
            (
                "Documents",
                &[
                    "pdf", "txt", "doc", "docx", "odt", "rtf", "md", "html", "htm", "csv", "xls",
                    "xlsx", "ods", "ppt", "pptx", "odp", "epub",
                ],
                &["application/pdf", "application/msword", "application/rtf"],
            ),
            (
                "Archives",
                &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "zst"],
                &[
                    "application/zip",
                    "application/x-rar-compressed",
                    "application/x-7z-compressed",
                    "application/x-tar",
                    "application/gzip",
                    "application/x-bzip2",
                    "application/x-xz",
                    "application/zstd",
                ],
            ),
            (
                "Code",
                &[
                    "rs", "py", "js", "ts", "c", "h", "cpp", "hpp", "java", "go", "sh", "json",
                    "toml", "yaml", "yml", "xml",
                ],
                &[],
            ),
        ];
        for (category, extensions, mimetypes) in table {
            for ext in extensions {
                self.add_extension_mapping(ext, category);
            }
            for mime in mimetypes {
                self.add_mime_mapping(mime, category);
            }
        }
    }

    fn add_rule(&mut self, category: &str, rule: &CategoryRule) {
        for ext in &rule.extensions {
            self.add_extension_mapping(ext, category);
        }
        for mime in &rule.mimetypes {
            self.add_mime_mapping(mime, category);
        }
    }

    /// Adds or replaces an extension mapping. A leading dot is ignored.
    pub fn add_extension_mapping(&mut self, ext: &str, category: &str) {
        self.extension_map.insert(
            ext.trim_start_matches('.').to_lowercase(),
            category.to_string(),
        );
    }

    pub fn add_mime_mapping(&mut self, mime: &str, category: &str) {
        self.mime_map
            .insert(mime.to_lowercase(), category.to_string());
    }

    pub fn extension_to_category(&self, ext: &str) -> Option<&str> {
        self.extension_map
            .get(&ext.trim_start_matches('.').to_lowercase())
            .map(String::as_str)
    }

    pub fn mime_to_category(&self, mime: &str) -> Option<&str> {
        self.mime_map.get(&mime.to_lowercase()).map(String::as_str)
    }

    /// Picks a category from an optional MIME type and extension.
    ///
    /// 1. configured extension
    /// 2. configured MIME type
    /// 3. MIME major type (`image`, `video`, `audio`, `text`, `application`)
    /// 4. the fallback category
    pub fn categorize(&self, mime_type: Option<&str>, ext: Option<&str>) -> &str {
        if let Some(extension) = ext
            && let Some(category) = self.extension_to_category(extension)
        {
            return category;
        }

        if let Some(mime) = mime_type {
            if let Some(category) = self.mime_to_category(mime) {
                return category;
            }
            if let Some(category) = major_type_category(mime) {
                return category;
            }
        }

        &self.fallback
    }

    /// Classifies a file on disk, sniffing its content signature.
    ///
    /// Unreadable files are classified by extension alone.
    pub fn classify(&self, path: &Path) -> String {
        let mime = match infer::get_from_path(path) {
            Ok(kind) => kind.map(|k| k.mime_type()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Content sniffing failed");
                None
            }
        };
        let ext = path.extension().map(|e| e.to_string_lossy());
        self.categorize(mime, ext.as_deref()).to_string()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassificationConfig::default())
    }
}

fn major_type_category(mime: &str) -> Option<&'static str> {
    let major = mime.split('/').next()?.to_lowercase();
    match major.as_str() {
        "image" => Some("Pictures"),
        "video" => Some("Videos"),
        "audio" => Some("Audio"),
        "text" | "application" => Some("Documents"),
        _ => None,
    }
}
