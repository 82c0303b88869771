use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

pub const REPO_KEY_LEN: usize = 10;

/// URL of a remote repository whose `.index/` directory is queried.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryLocation {
    url: String,
}

impl RepositoryLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn cache_key(&self) -> RepoCacheKey {
        RepoCacheKey::for_url(&self.url)
    }

    /// Directory under `data_dir` holding everything cached for this repository.
    pub fn repo_dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.cache_key().as_str())
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Filesystem-safe name of a repository's cache directory: the first ten
/// characters of the unpadded URL-safe base64 of SHA-256(url).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoCacheKey(String);

impl RepoCacheKey {
    pub fn for_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        let mut encoded = URL_SAFE_NO_PAD.encode(digest);
        encoded.truncate(REPO_KEY_LEN);
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
