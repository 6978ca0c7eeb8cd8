//! Portable snapshot document for the index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use minhash::{HasherSnapshot, Signature};

use crate::DocId;

/// Self-describing serialization of a [`crate::Cache`].
///
/// Contains everything needed to rebuild an equivalent index: the hasher
/// parameters, the band count, the per-band bucket tables, the fingerprint
/// table, and the set of seen ids. Restoration reproduces bit-exact
/// signatures and bucket membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Hasher parameters (seed vector and window width).
    pub hasher: HasherSnapshot,
    /// Number of bands the signatures are split into.
    pub num_bands: usize,
    /// For each band, `bucket_key -> member ids` (members sorted).
    pub buckets: Vec<BTreeMap<u64, Vec<DocId>>>,
    /// `doc_id -> signature`.
    pub fingerprints: BTreeMap<DocId, Signature>,
    /// Every id the index holds, sorted.
    pub seen_ids: Vec<DocId>,
}
