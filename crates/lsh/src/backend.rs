//! Storage contract for the LSH index.
//!
//! Backends are interchangeable exactly when they satisfy this trait's
//! contract; the index never downcasts. Two implementations ship: the
//! in-memory [`memory::MemoryBackend`] and the durable single-file
//! [`sqlite::SqliteBackend`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use minhash::Signature;

use crate::{DocId, LshError};

pub mod memory;
pub mod sqlite;

/// Hasher parameters persisted alongside the index so a durable file is
/// self-describing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HasherMeta {
    /// Signature length.
    pub num_seeds: usize,
    /// Shingle window width in bytes.
    pub ngram_width: usize,
    /// The full per-lane seed vector.
    pub seeds: Vec<u32>,
}

/// Storage contract shared by all index backends.
///
/// Contract highlights:
/// - `add` is atomic over the whole call: either every band row and the
///   fingerprint are stored, or nothing is. Adding an existing id is a
///   no-op returning `false`.
/// - `get_bucket` returns an owned, possibly empty set; it never fails on
///   an absent bucket.
/// - `scan_buckets` visits every non-empty bucket across all bands in an
///   unspecified order; empty buckets are never materialized, so the
///   visitor never observes one.
/// - `remove` is idempotent; `clear` returns to the empty state while
///   preserving the band count.
pub trait LshBackend: Send + Sync {
    /// Band count this backend was built (or reopened) with.
    fn num_bands(&self) -> usize;

    /// True iff zero documents are stored.
    fn is_empty(&self) -> Result<bool, LshError>;

    /// Store a document's bucket memberships and fingerprint atomically.
    /// Returns `false` without touching anything when the id is already
    /// present.
    fn add(
        &self,
        bucket_keys: &[(usize, u64)],
        signature: &Signature,
        doc_id: DocId,
    ) -> Result<bool, LshError>;

    /// The stored signature for `doc_id`, or [`LshError::NotFound`].
    fn get_fingerprint(&self, doc_id: DocId) -> Result<Signature, LshError>;

    /// Members of one bucket; empty set when the bucket does not exist.
    fn get_bucket(&self, band: usize, bucket: u64) -> Result<BTreeSet<DocId>, LshError>;

    /// Visit every non-empty bucket across all bands.
    fn scan_buckets(
        &self,
        visitor: &mut dyn FnMut(&BTreeSet<DocId>) -> Result<(), LshError>,
    ) -> Result<(), LshError>;

    /// Full per-band bucket tables, for snapshotting.
    fn buckets(&self) -> Result<Vec<BTreeMap<u64, BTreeSet<DocId>>>, LshError>;

    /// Full fingerprint table, for snapshotting.
    fn fingerprints(&self) -> Result<BTreeMap<DocId, Signature>, LshError>;

    /// Remove a document from every bucket it appears in and delete its
    /// fingerprint. A no-op for unknown ids.
    fn remove(&self, doc_id: DocId) -> Result<(), LshError>;

    /// Drop all documents, buckets, and cached bodies.
    fn clear(&self) -> Result<(), LshError>;

    /// Cheap existence check.
    fn doc_exists(&self, doc_id: DocId) -> Result<bool, LshError>;

    /// Store a raw document body.
    fn put_document(&self, doc_id: DocId, content: &[u8]) -> Result<(), LshError>;

    /// Fetch a raw document body, if one was stored.
    fn get_document(&self, doc_id: DocId) -> Result<Option<Vec<u8>>, LshError>;

    /// Persisted hasher parameters, when the backend carries them.
    fn hasher_meta(&self) -> Result<Option<HasherMeta>, LshError> {
        Ok(None)
    }

    /// Persist hasher parameters. Volatile backends may ignore this.
    fn put_hasher_meta(&self, _meta: &HasherMeta) -> Result<(), LshError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use lsh::BackendConfig;
///
/// // In-memory (default)
/// let config = BackendConfig::in_memory();
///
/// // Durable single-file store
/// let config = BackendConfig::sqlite("/tmp/neardup.sqlite");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Per-band hash maps in RAM. Fast, ephemeral.
    #[default]
    InMemory,
    /// Durable sqlite file at `path`. Created on first open; reopening an
    /// existing file adopts its stored band count (a conflicting requested
    /// count is a configuration error).
    Sqlite { path: PathBuf },
}

impl BackendConfig {
    /// In-memory backend configuration.
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    /// Durable backend configuration for the given file path.
    pub fn sqlite<P: Into<PathBuf>>(path: P) -> Self {
        BackendConfig::Sqlite { path: path.into() }
    }

    /// Build the backend for a given band count.
    pub fn build(&self, num_bands: usize) -> Result<Box<dyn LshBackend>, LshError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(memory::MemoryBackend::new(num_bands)?)),
            BackendConfig::Sqlite { path } => Ok(Box::new(sqlite::SqliteBackend::open(
                path,
                num_bands as i64,
            )?)),
        }
    }
}
