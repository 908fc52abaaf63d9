//! Disk-backed entry storage.
//!
//! Entries are published with temp-write + rename under a key-scoped lock,
//! so readers only ever see a complete old or a complete new file. All
//! operations are blocking and are meant to run on a blocking thread.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, warn};

use crate::domain::ImageKind;

use super::{
    CacheError,
    config::CacheConfig,
    entry::{EntryHeader, HEADER_LEN, parse_header},
    keys::CacheKey,
    lock::with_entry_lock,
};

const TARGET: &str = "thumbd::cache";

/// Filesystem facts about a published entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Absent,
    /// A recent fetch failure; `age` is below the backoff window.
    Sentinel { age: Duration },
    Present(EntryMeta),
}

/// An entry opened for serving, positioned at the start of its payload.
#[derive(Debug)]
pub struct OpenEntry {
    pub file: File,
    pub header: EntryHeader,
    pub meta: EntryMeta,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    config: CacheConfig,
}

impl CacheStore {
    /// Create the cache directory and its `index.html` guard if missing.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let directory = config.directory.clone();
        fs::create_dir_all(&directory).map_err(|source| CacheError::Directory {
            path: directory.clone(),
            source,
        })?;
        let index = directory.join("index.html");
        if !index.exists() {
            File::create(&index).map_err(|source| CacheError::Directory {
                path: index.clone(),
                source,
            })?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.config
            .directory
            .join(key.file_name(&self.config.prefix, &self.config.suffix))
    }

    fn lock_path(entry: &Path) -> PathBuf {
        let mut name = entry.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn lookup(&self, key: &CacheKey) -> Result<Lookup, CacheError> {
        let path = self.entry_path(key);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Lookup::Absent),
            Err(err) => return Err(CacheError::io("stat", path, err)),
        };
        let modified = metadata
            .modified()
            .map_err(|err| CacheError::io("stat", &path, err))?;

        if metadata.len() == 0 {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age < self.config.failure_backoff {
                return Ok(Lookup::Sentinel { age });
            }
            debug!(
                target = TARGET,
                op = "cache::lookup",
                result = "sentinel_expired",
                entry = %path.display(),
                age_secs = age.as_secs(),
                "Expired failure sentinel ignored"
            );
            // Left in place: the next `put` replaces it, and unlinking by path
            // could remove an entry published since the stat.
            return Ok(Lookup::Absent);
        }

        Ok(Lookup::Present(EntryMeta {
            path,
            modified,
            size: metadata.len(),
        }))
    }

    /// Atomically publish `bytes` as the entry for `key`.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let final_path = self.entry_path(key);
        let directory = &self.config.directory;

        let mut temp = tempfile::Builder::new()
            .prefix(&self.config.temp_prefix())
            .suffix(".tmp")
            .tempfile_in(directory)
            .map_err(|err| CacheError::io("create_temp", directory, err))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|err| CacheError::io("write_temp", temp.path(), err))?;

        // An error here drops `temp`, which unlinks it; the prior entry is untouched.
        with_entry_lock(Self::lock_path(&final_path), |_| {
            temp.persist(&final_path)
                .map(|_| ())
                .map_err(|err| CacheError::io("rename", &final_path, err.error))
        })?;

        debug!(
            target = TARGET,
            op = "cache::put",
            result = "published",
            entry = %final_path.display(),
            bytes = bytes.len(),
            "Cache entry published"
        );
        Ok(())
    }

    /// Record a recent fetch failure for `key`.
    pub fn mark_failure(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.put(key, &[])
    }

    pub fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        remove_if_exists(&self.entry_path(key))
    }

    /// Open a present entry and validate its header.
    ///
    /// Corrupt entries are deleted before [`CacheError::Corrupt`] is returned.
    pub fn open_entry(&self, key: &CacheKey) -> Result<OpenEntry, CacheError> {
        let path = self.entry_path(key);
        let mut file = File::open(&path).map_err(|err| CacheError::io("open", &path, err))?;
        let metadata = file
            .metadata()
            .map_err(|err| CacheError::io("stat", &path, err))?;
        let modified = metadata
            .modified()
            .map_err(|err| CacheError::io("stat", &path, err))?;

        let mut head = Vec::with_capacity(HEADER_LEN);
        (&mut file)
            .take(HEADER_LEN as u64)
            .read_to_end(&mut head)
            .map_err(|err| CacheError::io("read", &path, err))?;

        let header = match parse_header(&head, metadata.len()) {
            Ok(header) => header,
            Err(reason) => {
                warn!(
                    target = TARGET,
                    op = "cache::open_entry",
                    result = "corrupt",
                    entry = %path.display(),
                    reason,
                    "Corrupt cache entry removed"
                );
                drop(file);
                remove_if_exists(&path)?;
                return Err(CacheError::Corrupt { path, reason });
            }
        };

        Ok(OpenEntry {
            file,
            header,
            meta: EntryMeta {
                path,
                modified,
                size: metadata.len(),
            },
        })
    }

    /// Read a whole entry's payload into memory.
    pub fn read_payload(&self, key: &CacheKey) -> Result<(ImageKind, Vec<u8>), CacheError> {
        let mut entry = self.open_entry(key)?;
        let mut payload = Vec::with_capacity(entry.header.payload_len as usize);
        entry
            .file
            .read_to_end(&mut payload)
            .map_err(|err| CacheError::io("read", &entry.meta.path, err))?;
        Ok((entry.header.kind, payload))
    }

    /// Set an entry's mtime; used to age entries in maintenance paths and tests.
    pub fn touch(&self, key: &CacheKey, when: SystemTime) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        set_modified(&path, when)
    }
}

pub(crate) fn set_modified(path: &Path, when: SystemTime) -> Result<(), CacheError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .map_err(|err| CacheError::io("touch", path, err))
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(CacheError::io("remove", path, err)),
    }
}
