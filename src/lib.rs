//! # neardup
//!
//! Approximate near-duplicate detection over text corpora. The workspace
//! splits the problem into two layers, re-exported here so applications
//! can depend on a single crate:
//!
//! - [`minhash`](crate::MinHasher): deterministic MinHash fingerprints
//!   over character n-gram shingles, plus the Jaccard estimator.
//! - [`lsh`](crate::Cache): a banded LSH index with candidate generation,
//!   Jaccard refinement, duplicate-pair enumeration, and pluggable
//!   in-memory / durable sqlite storage.
//!
//! ## Quick start
//!
//! ```
//! use neardup::{Cache, CacheConfig, MinHasher, MinHasherConfig};
//!
//! let hasher = MinHasher::new(
//!     MinHasherConfig::new()
//!         .with_num_seeds(200)
//!         .with_char_ngram(5)
//!         .with_random_state(42),
//! )?;
//! let mut cache = Cache::new(hasher, CacheConfig::new().with_num_bands(50))?;
//!
//! cache.insert(b"This is a simple document", 0)?;
//! assert!(cache.is_duplicate(b"This is a simple document", None)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration files
//!
//! Deployments that prefer declarative wiring can describe the hasher and
//! the index in one YAML file and build the pipeline through
//! [`config::DedupConfig`]:
//!
//! ```
//! use neardup::config::DedupConfig;
//!
//! let cfg = DedupConfig::from_yaml_str(
//!     "hasher:\n  num_seeds: 200\n  char_ngram: 5\nindex:\n  num_bands: 50\n",
//! )?;
//! let cache = cfg.build_cache()?;
//! assert_eq!(cache.num_bands(), 50);
//! # Ok::<(), neardup::config::ConfigLoadError>(())
//! ```
//!
//! ## Observability
//!
//! The library emits structured `tracing` events (duplicate-insert
//! notices, candidate refinement counts, snapshot I/O); installing a
//! subscriber is the application's concern.

pub use lsh::{
    BackendConfig, BandProjection, Cache, CacheConfig, CacheSnapshot, DocId, HasherMeta,
    LshBackend, LshError, MemoryBackend, SqliteBackend, DEFAULT_MIN_SIMILARITY, RESERVED_DOC_ID,
    SCHEMA_VERSION,
};
pub use minhash::{
    jaccard, murmur3_x86_32, HasherSnapshot, MinHashError, MinHasher, MinHasherConfig, Signature,
    DEFAULT_RANDOM_STATE,
};

pub mod config;
