//! Cache key derivation.
//!
//! A key is a SHA-256 digest over an install salt, the source state and the
//! request query. Local keys fold in the source mtime so edits invalidate
//! them; external keys sort the query so parameter order is irrelevant.

use std::{
    fmt, fs,
    time::{SystemTime, UNIX_EPOCH},
};

use sha2::{Digest, Sha256};

use crate::domain::SourceDescriptor;

/// Bumped whenever the entry layout or transform output changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Whether an entry was produced from a local file or an external fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Internal,
    External,
}

impl Origin {
    fn marker(self) -> &'static str {
        match self {
            Origin::Internal => "_int_",
            Origin::External => "_ext_",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    origin: Origin,
    digest: String,
}

impl CacheKey {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// `{prefix}_int_{digest}{suffix}` or `{prefix}_ext_{digest}{suffix}`.
    pub fn file_name(&self, prefix: &str, suffix: &str) -> String {
        format!("{prefix}{}{}{suffix}", self.origin.marker(), self.digest)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin.marker(), self.digest)
    }
}

/// Derives [`CacheKey`]s for requests. Pure once constructed.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    salt: String,
}

impl KeyDeriver {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Salt from the running binary's mtime and inode, so upgrades start a fresh cache.
    pub fn from_current_exe() -> Self {
        Self::new(install_salt().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()))
    }

    pub fn derive(&self, source: &SourceDescriptor, query: &str) -> CacheKey {
        let (origin, identity) = match source {
            SourceDescriptor::Local { path, modified, .. } => (
                Origin::Internal,
                format!("{}\n{}", path.display(), timestamp(*modified)),
            ),
            SourceDescriptor::External { url } => (Origin::External, url.as_str().to_string()),
        };

        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(identity.as_bytes());
        hasher.update([0u8]);
        hasher.update(sorted_query(query).as_bytes());
        hasher.update([0u8]);
        hasher.update(FORMAT_VERSION.to_be_bytes());

        CacheKey {
            origin,
            digest: hex::encode(hasher.finalize()),
        }
    }
}

fn sorted_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    pairs.sort_unstable();
    pairs.join("&")
}

fn timestamp(time: SystemTime) -> String {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
}

fn install_salt() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let metadata = fs::metadata(exe).ok()?;
    let modified = timestamp(metadata.modified().ok()?);
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(format!("{modified}-{}", metadata.ino()))
    }
    #[cfg(not(unix))]
    {
        Some(format!("{modified}-{}", metadata.len()))
    }
}
