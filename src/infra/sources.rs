//! Local source resolution under a document root.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};

use thiserror::Error;

use crate::domain::SourceDescriptor;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Could not find the internal image you specified.")]
    NotFound { path: PathBuf },
    #[error("Could not find the internal image you specified.")]
    OutsideRoot { path: PathBuf },
    #[error("The file you specified is <= 0 bytes.")]
    Empty,
    #[error("The file you specified is greater than the maximum allowed file size.")]
    TooLarge { size: u64, max: u64 },
    #[error("document root `{}` is unusable", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to inspect `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound { .. } | SourceError::OutsideRoot { .. }
        )
    }
}

/// Turns a `src` parameter into a verified regular file under the document root.
#[derive(Debug, Clone)]
pub struct LocalSourceResolver {
    root: PathBuf,
    max_file_size: u64,
}

impl LocalSourceResolver {
    pub fn new(document_root: &Path, max_file_size: u64) -> Result<Self, SourceError> {
        let root = fs::canonicalize(document_root).map_err(|source| SourceError::Root {
            path: document_root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root,
            max_file_size,
        })
    }

    /// Resolve `src`, returning its path, mtime and size. Blocking.
    pub fn resolve(&self, src: &str) -> Result<SourceDescriptor, SourceError> {
        let relative = Path::new(src.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| matches!(component, Component::Prefix(_) | Component::RootDir))
        {
            return Err(SourceError::OutsideRoot {
                path: relative.to_path_buf(),
            });
        }

        let candidate = self.root.join(relative);
        let path = match fs::canonicalize(&candidate) {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SourceError::NotFound { path: candidate });
            }
            Err(source) => {
                return Err(SourceError::Io {
                    path: candidate,
                    source,
                });
            }
        };
        if !path.starts_with(&self.root) {
            return Err(SourceError::OutsideRoot { path });
        }

        let metadata = fs::metadata(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(SourceError::NotFound { path });
        }
        let size = metadata.len();
        if size == 0 {
            return Err(SourceError::Empty);
        }
        if size > self.max_file_size {
            return Err(SourceError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }
        let modified = metadata.modified().map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(SourceDescriptor::Local {
            path,
            modified,
            size,
        })
    }
}
