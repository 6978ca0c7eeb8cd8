//! Error taxonomy across the public surface.

use neardup::config::{ConfigLoadError, DedupConfig};
use neardup::{
    Cache, CacheConfig, LshError, MinHashError, MinHasher, MinHasherConfig, RESERVED_DOC_ID,
};

fn hasher() -> MinHasher {
    MinHasher::new(
        MinHasherConfig::new()
            .with_num_seeds(60)
            .with_char_ngram(4)
            .with_random_state(11),
    )
    .unwrap()
}

fn cache() -> Cache {
    Cache::new(hasher(), CacheConfig::new().with_num_bands(20)).unwrap()
}

#[test]
fn invalid_hasher_parameters_fail_at_construction() {
    assert!(matches!(
        MinHasher::new(MinHasherConfig::new().with_num_seeds(0)),
        Err(MinHashError::InvalidNumSeeds { .. })
    ));
    assert!(matches!(
        MinHasher::new(MinHasherConfig::new().with_char_ngram(0)),
        Err(MinHashError::InvalidCharNgram { .. })
    ));
}

#[test]
fn unknown_ids_are_not_found() {
    let cache = cache();
    assert!(matches!(
        cache.candidates_of_id(404),
        Err(LshError::NotFound { doc_id: 404 })
    ));
    assert!(matches!(
        cache.duplicates_of_id(404, 0.0),
        Err(LshError::NotFound { doc_id: 404 })
    ));
}

#[test]
fn uncached_document_bodies_are_not_cached() {
    let mut with_bodies = Cache::new(
        hasher(),
        CacheConfig::new()
            .with_num_bands(20)
            .with_cache_documents(true),
    )
    .unwrap();
    with_bodies.insert(b"stored", 1).unwrap();
    assert_eq!(with_bodies.get_document(1).unwrap(), b"stored");
    assert!(matches!(
        with_bodies.get_document(2),
        Err(LshError::NotFound { doc_id: 2 })
    ));

    let mut without_bodies = cache();
    without_bodies.insert(b"not stored", 1).unwrap();
    assert!(matches!(
        without_bodies.get_document(1),
        Err(LshError::NotCached)
    ));
}

#[test]
fn reserved_id_is_an_argument_error() {
    let mut c = cache();
    assert!(matches!(
        c.insert(b"doc", RESERVED_DOC_ID),
        Err(LshError::Argument { .. })
    ));
    assert!(matches!(
        c.remove(RESERVED_DOC_ID),
        Err(LshError::Argument { .. })
    ));
}

#[test]
fn duplicate_insert_is_a_silent_false_not_an_error() {
    let mut c = cache();
    assert!(c.insert(b"the body", 1).unwrap());
    assert!(!c.insert(b"another body", 1).unwrap());
    // The original mapping is untouched.
    assert!(c.candidates_of(b"the body").unwrap().contains(&1));
    assert!(!c.candidates_of(b"another body").unwrap().contains(&1));
}

#[test]
fn config_errors_carry_the_offending_selector() {
    let cfg = DedupConfig::from_yaml_str("index:\n  backend: tape-robot\n").unwrap();
    match cfg.build_cache() {
        Err(ConfigLoadError::UnknownBackend(selector)) => assert_eq!(selector, "tape-robot"),
        other => panic!("expected UnknownBackend, got {other:?}"),
    }
}

#[test]
fn errors_render_readable_messages() {
    let err = LshError::NotFound { doc_id: 12 };
    assert_eq!(err.to_string(), "unknown document id 12");

    let err = MinHashError::InvalidCharNgram { char_ngram: 0 };
    assert!(err.to_string().contains("char_ngram"));
}
