//! End-to-end behavior over the durable sqlite backend.

use std::collections::BTreeSet;
use std::path::PathBuf;

use neardup::{
    BackendConfig, Cache, CacheConfig, LshBackend, LshError, MinHasher, MinHasherConfig,
    SqliteBackend,
};

fn hasher(random_state: u64) -> MinHasher {
    MinHasher::new(
        MinHasherConfig::new()
            .with_num_seeds(100)
            .with_char_ngram(4)
            .with_random_state(random_state),
    )
    .unwrap()
}

fn sqlite_config(path: &PathBuf, num_bands: usize) -> CacheConfig {
    CacheConfig::new()
        .with_num_bands(num_bands)
        .with_backend(BackendConfig::sqlite(path))
}

#[test]
fn insert_query_remove_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();

    assert!(cache.insert(b"a durable document body", 1).unwrap());
    assert!(!cache.insert(b"a durable document body", 1).unwrap());
    cache.insert(b"a durable document body!", 2).unwrap();

    assert_eq!(
        cache.duplicates_of(b"a durable document body", 0.0).unwrap(),
        BTreeSet::from([1, 2])
    );
    assert!(cache.is_duplicate(b"a durable document body", None).unwrap());

    cache.remove(2).unwrap();
    assert_eq!(
        cache.candidates_of(b"a durable document body").unwrap(),
        BTreeSet::from([1])
    );
}

#[test]
fn index_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    {
        let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
        cache.insert(b"persisted across connections", 7).unwrap();
    }

    let reopened = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
    assert!(!reopened.is_empty().unwrap());
    assert_eq!(
        reopened.candidates_of(b"persisted across connections").unwrap(),
        BTreeSet::from([7])
    );
    assert!(reopened
        .is_duplicate(b"persisted across connections", None)
        .unwrap());
}

#[test]
fn reopen_with_conflicting_band_count_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    drop(Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap());

    let err = Cache::new(hasher(3), sqlite_config(&path, 20)).unwrap_err();
    assert!(matches!(err, LshError::Config { .. }));
}

#[test]
fn sentinel_open_adopts_the_stored_band_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    {
        let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
        cache.insert(b"written before the adopting open", 1).unwrap();
    }

    let backend = SqliteBackend::open(&path, -1).unwrap();
    assert_eq!(backend.num_bands(), 25);
    let cache = Cache::with_backend(hasher(3), Box::new(backend), false).unwrap();
    assert_eq!(cache.num_bands(), 25);
    assert!(cache
        .candidates_of(b"written before the adopting open")
        .unwrap()
        .contains(&1));
}

#[test]
fn reopen_with_a_different_hasher_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    drop(Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap());

    let err = Cache::new(hasher(4), sqlite_config(&path, 25)).unwrap_err();
    assert!(matches!(err, LshError::Config { .. }));
}

#[test]
fn document_bodies_persist_when_caching_is_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    {
        let mut cache = Cache::new(
            hasher(3),
            sqlite_config(&path, 25).with_cache_documents(true),
        )
        .unwrap();
        cache.insert(b"the cached body", 5).unwrap();
        assert_eq!(cache.get_document(5).unwrap(), b"the cached body");
    }

    let reopened = Cache::new(
        hasher(3),
        sqlite_config(&path, 25).with_cache_documents(true),
    )
    .unwrap();
    assert_eq!(reopened.get_document(5).unwrap(), b"the cached body");
}

#[test]
fn document_lookup_without_caching_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
    cache.insert(b"body", 1).unwrap();
    assert!(matches!(cache.get_document(1), Err(LshError::NotCached)));
}

#[test]
fn transient_lookups_leave_the_file_clean() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
    cache.insert(b"the only real document", 1).unwrap();

    let dups = cache.duplicates_of(b"the only real document", 0.0).unwrap();
    assert_eq!(dups, BTreeSet::from([1]));

    // Only the real document remains after the sentinel round trip.
    let snapshot = cache.snapshot().unwrap();
    assert_eq!(snapshot.seen_ids, vec![1]);
}

#[test]
fn clear_keeps_the_file_reusable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut cache = Cache::new(hasher(3), sqlite_config(&path, 25)).unwrap();
    cache.insert(b"first generation", 1).unwrap();

    cache.clear().unwrap();
    assert!(cache.is_empty().unwrap());

    cache.insert(b"second generation", 2).unwrap();
    assert_eq!(
        cache.candidates_of(b"second generation").unwrap(),
        BTreeSet::from([2])
    );
}
