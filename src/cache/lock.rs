use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tracing::warn;

use super::CacheError;

/// Exclusive advisory lock on a key-scoped lock file.
///
/// Held only around the rename that publishes an entry. Dropping the guard
/// unlocks and removes the lock file on every exit path.
#[derive(Debug)]
pub(crate) struct EntryLock {
    file: File,
    path: PathBuf,
}

impl EntryLock {
    /// Blocks until the lock is held on the file currently linked at `path`.
    ///
    /// A releasing holder unlinks the file before unlocking it, so a waiter
    /// can wake up holding an orphaned inode; it then reopens and retries.
    pub(crate) fn acquire(path: PathBuf) -> Result<Self, CacheError> {
        let lock_error = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };
        loop {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(lock_error)?;
            file.lock().map_err(lock_error)?;
            if is_linked_at(&file, &path).map_err(lock_error)? {
                return Ok(Self { file, path });
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        // Unlink while still held.
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                target = "thumbd::cache",
                op = "lock::release",
                result = "remove_failed",
                lock_path = %self.path.display(),
                error = %err,
                "Failed to remove cache lock file"
            ),
        }
        if let Err(err) = self.file.unlock() {
            warn!(
                target = "thumbd::cache",
                op = "lock::release",
                result = "unlock_failed",
                lock_path = %self.path.display(),
                error = %err,
                "Failed to release cache lock"
            );
        }
    }
}

#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Run `f` while holding the lock at `path`.
pub(crate) fn with_entry_lock<T>(
    path: PathBuf,
    f: impl FnOnce(&EntryLock) -> Result<T, CacheError>,
) -> Result<T, CacheError> {
    let guard = EntryLock::acquire(path)?;
    f(&guard)
}
