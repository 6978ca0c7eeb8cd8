//! # Banded LSH index
//!
//! Locality-Sensitive Hashing over MinHash signatures: signatures are cut
//! into `num_bands` contiguous bands, each band is reduced to a 64-bit
//! bucket key, and documents whose signatures agree on a whole band land
//! in the same bucket. Near-duplicate lookups then touch only the
//! documents sharing at least one bucket with the query instead of the
//! whole corpus.
//!
//! ## Core types
//!
//! - [`Cache`]: the index. Insert documents (or raw signatures), query
//!   candidates and refined duplicates, enumerate duplicate pairs, remove
//!   documents, snapshot and restore.
//! - [`LshBackend`]: the storage contract. Two implementations ship:
//!   [`MemoryBackend`] (per-band hash maps) and [`SqliteBackend`] (a
//!   durable, self-describing single-file store).
//! - [`BandProjection`]: the deterministic signature-to-bucket-keys step.
//!
//! ## Example
//!
//! ```
//! use lsh::{Cache, CacheConfig};
//! use minhash::{MinHasher, MinHasherConfig};
//!
//! let hasher = MinHasher::new(
//!     MinHasherConfig::new()
//!         .with_num_seeds(200)
//!         .with_char_ngram(5)
//!         .with_random_state(42),
//! )
//! .unwrap();
//! let mut cache = Cache::new(hasher, CacheConfig::new().with_num_bands(50)).unwrap();
//!
//! cache.insert(b"This is a simple document", 0).unwrap();
//! let candidates = cache.candidates_of(b"This is a simple document").unwrap();
//! assert!(candidates.contains(&0));
//! ```

mod backend;
mod bands;
mod cache;
mod snapshot;

pub use crate::backend::memory::MemoryBackend;
pub use crate::backend::sqlite::{SqliteBackend, SCHEMA_VERSION};
pub use crate::backend::{BackendConfig, HasherMeta, LshBackend};
pub use crate::bands::BandProjection;
pub use crate::cache::{Cache, CacheConfig, DEFAULT_MIN_SIMILARITY};
pub use crate::snapshot::CacheSnapshot;

use thiserror::Error;

/// Caller-supplied document identifier.
pub type DocId = i64;

/// Sentinel id used internally for transient lookups; never valid for
/// callers.
pub const RESERVED_DOC_ID: DocId = -1;

/// Errors surfaced by the index and its backends.
#[derive(Debug, Error, Clone)]
pub enum LshError {
    /// Construction-time misconfiguration (band count, backend selector,
    /// persisted-state mismatch). A programmer bug: fail loudly.
    #[error("invalid config: {reason}")]
    Config { reason: String },

    /// Invalid call-site argument (reserved id, wrong signature length).
    #[error("invalid argument: {reason}")]
    Argument { reason: String },

    /// Lookup by an id the index has never seen (or no longer holds).
    #[error("unknown document id {doc_id}")]
    NotFound { doc_id: DocId },

    /// Document-body lookup on a cache built without document caching.
    #[error("document bodies are not stored; enable cache_documents at construction")]
    NotCached,

    /// I/O or transaction failure inside a backend, surfaced verbatim
    /// after rollback.
    #[error("backend error: {0}")]
    Backend(String),
}

impl LshError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        LshError::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        LshError::Argument {
            reason: reason.into(),
        }
    }

    /// Wrap any displayable backend failure.
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        LshError::Backend(err.to_string())
    }
}
