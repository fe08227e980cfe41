use crate::error::{InstallError, InstallResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Supported content hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    /// CurseForge-style MurmurHash2 fingerprint.
    Fingerprint,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Fingerprint => "fingerprint",
        }
    }

    fn hex_len(&self) -> Option<usize> {
        match self {
            HashAlgorithm::Md5 => Some(32),
            HashAlgorithm::Sha1 => Some(40),
            HashAlgorithm::Sha256 => Some(64),
            HashAlgorithm::Sha512 => Some(128),
            HashAlgorithm::Fingerprint => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed digest. Hex digests are stored lowercase so equality is
/// case-insensitive with respect to the text they were parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "value", rename_all = "lowercase")]
pub enum HashCode {
    Md5(String),
    Sha1(String),
    Sha256(String),
    Sha512(String),
    Fingerprint(u32),
}

impl HashCode {
    pub fn parse(algorithm: HashAlgorithm, text: &str) -> InstallResult<Self> {
        let text = text.trim();
        if algorithm == HashAlgorithm::Fingerprint {
            return text
                .parse::<u32>()
                .map(HashCode::Fingerprint)
                .map_err(|_| InstallError::config(format!("Invalid fingerprint: {}", text)));
        }

        let expected_len = algorithm.hex_len().unwrap_or(0);
        if text.len() != expected_len || !text.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InstallError::config(format!(
                "Invalid {} digest: {}",
                algorithm, text
            )));
        }
        Ok(Self::from_hex_unchecked(algorithm, text.to_ascii_lowercase()))
    }

    /// Infer the algorithm from the shape of `text` the way catalogs hand
    /// hashes out: hex length picks the digest, pure decimal is a fingerprint.
    pub fn infer(text: &str) -> InstallResult<Self> {
        let text = text.trim();
        let algorithm = if text.chars().all(|c| c.is_ascii_digit()) && text.len() <= 10 {
            HashAlgorithm::Fingerprint
        } else {
            match text.len() {
                32 => HashAlgorithm::Md5,
                40 => HashAlgorithm::Sha1,
                64 => HashAlgorithm::Sha256,
                128 => HashAlgorithm::Sha512,
                _ => {
                    return Err(InstallError::config(format!(
                        "Cannot infer hash algorithm for: {}",
                        text
                    )))
                }
            }
        };
        Self::parse(algorithm, text)
    }

    pub(crate) fn from_hex_unchecked(algorithm: HashAlgorithm, hex: String) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => HashCode::Md5(hex),
            HashAlgorithm::Sha1 => HashCode::Sha1(hex),
            HashAlgorithm::Sha256 => HashCode::Sha256(hex),
            HashAlgorithm::Sha512 => HashCode::Sha512(hex),
            HashAlgorithm::Fingerprint => HashCode::Fingerprint(hex.parse().unwrap_or(0)),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            HashCode::Md5(_) => HashAlgorithm::Md5,
            HashCode::Sha1(_) => HashAlgorithm::Sha1,
            HashCode::Sha256(_) => HashAlgorithm::Sha256,
            HashCode::Sha512(_) => HashAlgorithm::Sha512,
            HashCode::Fingerprint(_) => HashAlgorithm::Fingerprint,
        }
    }

    /// The digest as text: lowercase hex, or decimal for fingerprints.
    pub fn value(&self) -> String {
        match self {
            HashCode::Md5(h) | HashCode::Sha1(h) | HashCode::Sha256(h) | HashCode::Sha512(h) => {
                h.clone()
            }
            HashCode::Fingerprint(n) => n.to_string(),
        }
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), self.value())
    }
}

/// A single downloadable or copyable file tracked by the engine.
///
/// Treated as an immutable value once handed to a `DownloadPool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Display name used in logs, progress labels and errors.
    pub name: String,
    /// Source URL. May be empty when `local_source` provides the content.
    pub url: String,
    pub destination: PathBuf,
    pub size: Option<u64>,
    pub hash: Option<HashCode>,
    /// Accept the file even when its post-download hash disagrees.
    pub allow_hash_failure: bool,
    /// A file on the same filesystem to copy instead of fetching `url`.
    pub local_source: Option<PathBuf>,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            destination: destination.into(),
            size: None,
            hash: None,
            allow_hash_failure: false,
            local_source: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_optional_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_hash(mut self, hash: HashCode) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_optional_hash(mut self, hash: Option<HashCode>) -> Self {
        self.hash = hash;
        self
    }

    pub fn allow_hash_failure(mut self, allow: bool) -> Self {
        self.allow_hash_failure = allow;
        self
    }

    pub fn with_local_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.local_source = Some(source.into());
        self
    }

    /// An artifact without size or hash can never be proven present.
    pub fn is_unverifiable(&self) -> bool {
        self.size.is_none() && self.hash.is_none()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}
