//! Thumbnail disk cache.
//!
//! Entries live in a single directory and are addressed by a digest of the
//! request, see [`KeyDeriver`]. Writes go through a temp file and an atomic
//! rename guarded by a per-key lock; zero-length entries record recent fetch
//! failures.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! directory = "./cache"
//! prefix = "thumbd"
//! suffix = ".cache"
//! clean_interval_seconds = 86400
//! max_age_seconds = 86400
//! failure_backoff_seconds = 3600
//! ```

mod cleanup;
mod config;
mod entry;
mod error;
mod keys;
mod lock;
mod store;

pub use cleanup::CleanupOutcome;
pub use config::CacheConfig;
pub use entry::{DELIMITER, EntryHeader, HEADER_LEN, PREAMBLE, encode_entry, parse_header};
pub use error::CacheError;
pub use keys::{CacheKey, FORMAT_VERSION, KeyDeriver, Origin};
pub use store::{CacheStore, EntryMeta, Lookup, OpenEntry};
