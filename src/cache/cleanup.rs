//! Rate-limited removal of expired entries.
//!
//! A marker file's mtime records the last pass. Concurrent triggers from
//! several requests or processes only repeat work; deletions tolerate files
//! that vanish underneath them.

use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    time::{Instant, SystemTime},
};

use tracing::{info, warn};

use super::{
    CacheError, CacheStore,
    store::{remove_if_exists, set_modified},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Disabled,
    /// First run: the marker was created and nothing was deleted.
    MarkerCreated,
    NotDue,
    Cleaned { removed: usize },
}

impl CacheStore {
    /// Run a cleanup pass if the configured interval has elapsed.
    pub fn cleanup(&self) -> Result<CleanupOutcome, CacheError> {
        let Some(interval) = self.config().clean_interval else {
            return Ok(CleanupOutcome::Disabled);
        };
        let marker = self.config().marker_path();

        let last_clean = match fs::metadata(&marker) {
            Ok(metadata) => metadata
                .modified()
                .map_err(|err| CacheError::io("stat", &marker, err))?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&marker)
                    .map_err(|err| CacheError::io("create_marker", &marker, err))?;
                return Ok(CleanupOutcome::MarkerCreated);
            }
            Err(err) => return Err(CacheError::io("stat", &marker, err)),
        };

        let since = SystemTime::now()
            .duration_since(last_clean)
            .unwrap_or_default();
        if since < interval {
            return Ok(CleanupOutcome::NotDue);
        }

        // Stamp first so parallel requests see the pass as taken.
        set_modified(&marker, SystemTime::now())?;
        let removed = self.purge_expired()?;
        Ok(CleanupOutcome::Cleaned { removed })
    }

    /// Delete every entry and orphaned temp file older than the max age.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let started_at = Instant::now();
        let config = self.config();
        let directory = &config.directory;
        let temp_prefix = config.temp_prefix();
        let now = SystemTime::now();

        let entries =
            fs::read_dir(directory).map_err(|err| CacheError::io("read_dir", directory, err))?;

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|err| CacheError::io("read_dir", directory, err))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_entry = name.starts_with(config.prefix.as_str())
                && name.ends_with(config.suffix.as_str());
            let is_orphan = name.starts_with(temp_prefix.as_str()) && name.ends_with(".tmp");
            if !is_entry && !is_orphan {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
                Ok(modified) => modified,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(
                        target = "thumbd::cache",
                        op = "cache::purge_expired",
                        result = "stat_failed",
                        entry = %path.display(),
                        error = %err,
                        "Skipping unreadable cache entry"
                    );
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > config.max_age {
                remove_if_exists(&path)?;
                removed += 1;
            }
        }

        info!(
            target = "thumbd::cache",
            op = "cache::purge_expired",
            result = "ok",
            removed,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Cache cleanup finished"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        cache::{CacheConfig, KeyDeriver, Lookup},
        domain::SourceDescriptor,
    };

    fn store(dir: &TempDir, interval: Option<Duration>) -> CacheStore {
        let config = CacheConfig {
            clean_interval: interval,
            max_age: Duration::from_secs(60),
            ..CacheConfig::in_directory(dir.path())
        };
        CacheStore::open(config).expect("open store")
    }

    fn key(n: u32) -> crate::cache::CacheKey {
        let source = SourceDescriptor::Local {
            path: PathBuf::from("/srv/a.png"),
            modified: SystemTime::UNIX_EPOCH,
            size: 1,
        };
        KeyDeriver::new("cleanup").derive(&source, &format!("w={n}"))
    }

    #[test]
    fn disabled_interval_never_cleans() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir, None);
        assert_eq!(store.cleanup().expect("cleanup"), CleanupOutcome::Disabled);
    }

    #[test]
    fn first_call_only_creates_marker_then_waits_for_interval() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir, Some(Duration::from_secs(3600)));
        assert_eq!(
            store.cleanup().expect("cleanup"),
            CleanupOutcome::MarkerCreated
        );
        assert!(store.config().marker_path().exists());
        assert_eq!(store.cleanup().expect("cleanup"), CleanupOutcome::NotDue);
    }

    #[test]
    fn due_cleanup_removes_only_expired_entries() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir, Some(Duration::from_secs(3600)));
        store.cleanup().expect("create marker");

        let old = key(1);
        let fresh = key(2);
        store.put(&old, b"old").expect("put old");
        store.put(&fresh, b"fresh").expect("put fresh");
        let long_ago = SystemTime::now() - Duration::from_secs(7200);
        store.touch(&old, long_ago).expect("age entry");
        set_modified(&store.config().marker_path(), long_ago).expect("age marker");

        let orphan = dir.path().join("thumbd_tmp_abc.tmp");
        fs::write(&orphan, b"partial").expect("write orphan");
        set_modified(&orphan, long_ago).expect("age orphan");

        assert_eq!(
            store.cleanup().expect("cleanup"),
            CleanupOutcome::Cleaned { removed: 2 }
        );
        assert_eq!(store.lookup(&old).expect("lookup"), Lookup::Absent);
        assert!(matches!(
            store.lookup(&fresh).expect("lookup"),
            Lookup::Present(_)
        ));
        assert!(!orphan.exists());
        assert!(dir.path().join("index.html").exists());
    }

    #[test]
    fn purge_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir, Some(Duration::from_secs(1)));
        let old = key(3);
        store.put(&old, b"old").expect("put");
        store
            .touch(&old, SystemTime::now() - Duration::from_secs(600))
            .expect("age entry");
        assert_eq!(store.purge_expired().expect("purge"), 1);
        assert_eq!(store.purge_expired().expect("purge"), 0);
    }

    #[test]
    fn purge_skips_files_without_the_cache_prefix() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir, None);
        let foreign = dir.path().join("other-tool.cache");
        fs::write(&foreign, b"not ours").expect("write foreign file");
        set_modified(&foreign, SystemTime::now() - Duration::from_secs(600)).expect("age foreign");

        assert_eq!(store.purge_expired().expect("purge"), 0);
        assert!(foreign.exists());
    }
}
