use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::SystemTime,
};

use tempfile::TempDir;
use thumbd::{
    cache::{CacheConfig, CacheStore, KeyDeriver, encode_entry},
    domain::{ImageKind, SourceDescriptor},
};

const WRITERS: usize = 6;
const ROUNDS: usize = 40;

fn payload(writer: usize) -> Vec<u8> {
    vec![writer as u8; 32 * 1024 + writer]
}

#[test]
fn readers_never_observe_torn_entries() {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(CacheStore::open(CacheConfig::in_directory(dir.path())).expect("store"));
    let key = KeyDeriver::new("concurrency").derive(
        &SourceDescriptor::Local {
            path: PathBuf::from("/srv/a.png"),
            modified: SystemTime::UNIX_EPOCH,
            size: 1,
        },
        "w=10&h=10",
    );
    store
        .put(&key, &encode_entry(ImageKind::Png, &payload(0)))
        .expect("seed entry");

    let mut handles = Vec::new();
    for writer in 1..=WRITERS {
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(thread::spawn(move || {
            let entry = encode_entry(ImageKind::Png, &payload(writer));
            for _ in 0..ROUNDS {
                store.put(&key, &entry).expect("put");
            }
        }));
    }
    for _ in 0..WRITERS {
        let store = Arc::clone(&store);
        let key = key.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let (kind, bytes) = store.read_payload(&key).expect("complete entry");
                assert_eq!(kind, ImageKind::Png);
                let writer = bytes[0] as usize;
                assert_eq!(bytes, payload(writer), "torn payload from writer {writer}");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("thread");
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp") || name.ends_with(".lock"))
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}
