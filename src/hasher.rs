//! Content digests for duplicate detection and move verification.
//!
//! Two modes are offered:
//! - a *sampled* digest over the head and tail of a file, used as a cheap
//!   bucketing key. It is a probabilistic pre-filter, not proof of identity.
//! - a *full* digest that streams the whole file in fixed-size chunks.
//!
//! The algorithm name is part of a digest's identity: two digests produced by
//! different algorithms never compare equal.

use crate::error::{RelocationError, RelocationResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

/// Default number of bytes read from each end of a file for sampled digests.
pub const DEFAULT_SAMPLE_SIZE: u64 = 64 * 1024;

/// Default read buffer for full digests.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Supported hash algorithms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// All algorithms, in the order journal readers probe for them.
    pub const ALL: [HashAlgorithm; 3] = [Self::Sha256, Self::Sha512, Self::Blake3];

    /// The canonical lowercase name, also used as the journal field name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    fn hasher(&self) -> StreamHasher {
        match self {
            Self::Sha256 => StreamHasher::Sha256(Sha256::new()),
            Self::Sha512 => StreamHasher::Sha512(Sha512::new()),
            Self::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == lowered.replace('-', ""))
            .ok_or_else(|| {
                format!(
                    "unsupported hash algorithm '{}' (expected one of: sha256, sha512, blake3)",
                    s
                )
            })
    }
}

/// A hex-encoded digest tagged with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ContentDigest {
    pub fn new(algorithm: HashAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into(),
        }
    }

    /// The first `len` hex characters, for display.
    pub fn short(&self, len: usize) -> &str {
        &self.hex[..len.min(self.hex.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

enum StreamHasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
            Self::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Settings for a [`ContentHasher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasherConfig {
    pub algorithm: HashAlgorithm,
    pub sample_size: u64,
    pub chunk_size: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Computes sampled and full digests with one fixed algorithm.
///
/// Sampled and full digests from one instance always share its algorithm.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    config: HasherConfig,
}

impl ContentHasher {
    pub fn new(config: HasherConfig) -> Self {
        let config = HasherConfig {
            sample_size: config.sample_size.max(1),
            chunk_size: config.chunk_size.max(1),
            ..config
        };
        Self { config }
    }

    /// A hasher with default sizes for the given algorithm.
    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self::new(HasherConfig {
            algorithm,
            ..HasherConfig::default()
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.config.algorithm
    }

    /// Returns a copy of this hasher using another algorithm but the same sizes.
    pub fn for_algorithm(&self, algorithm: HashAlgorithm) -> Self {
        Self::new(HasherConfig {
            algorithm,
            ..self.config
        })
    }

    /// Digest of the first and last `sample_size` bytes.
    ///
    /// Files no larger than twice the sample size are hashed in full, so for
    /// them the sampled digest covers every byte.
    pub fn sampled_digest(&self, path: &Path) -> RelocationResult<ContentDigest> {
        let sample = self.config.sample_size;
        let mut file = File::open(path).map_err(|e| RelocationError::unreadable(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| RelocationError::unreadable(path, e))?
            .len();

        let mut hasher = self.config.algorithm.hasher();
        if size <= sample.saturating_mul(2) {
            self.stream_into(&mut hasher, &mut file, path)?;
        } else {
            let mut head = (&mut file).take(sample);
            self.stream_into(&mut hasher, &mut head, path)?;
            file.seek(SeekFrom::End(-(sample as i64)))
                .map_err(|e| RelocationError::unreadable(path, e))?;
            let mut tail = (&mut file).take(sample);
            self.stream_into(&mut hasher, &mut tail, path)?;
        }

        Ok(ContentDigest::new(
            self.config.algorithm,
            hasher.finalize_hex(),
        ))
    }

    /// Digest of the entire file, streamed in `chunk_size` pieces.
    pub fn full_digest(&self, path: &Path) -> RelocationResult<ContentDigest> {
        self.full_digest_with_size(path).map(|(digest, _)| digest)
    }

    /// Full digest plus the number of bytes that were hashed.
    pub fn full_digest_with_size(&self, path: &Path) -> RelocationResult<(ContentDigest, u64)> {
        let mut file = File::open(path).map_err(|e| RelocationError::unreadable(path, e))?;
        let mut hasher = self.config.algorithm.hasher();
        let size = self.stream_into(&mut hasher, &mut file, path)?;
        Ok((
            ContentDigest::new(self.config.algorithm, hasher.finalize_hex()),
            size,
        ))
    }

    fn stream_into(
        &self,
        hasher: &mut StreamHasher,
        reader: &mut impl Read,
        path: &Path,
    ) -> RelocationResult<u64> {
        let mut buffer = vec![0_u8; self.config.chunk_size];
        let mut total = 0_u64;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RelocationError::unreadable(path, e)),
            };
            hasher.update(&buffer[..read]);
            total += read as u64;
        }
        Ok(total)
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HasherConfig::default())
    }
}
