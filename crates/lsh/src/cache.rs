//! The LSH index: orchestrates hashing, banding, and storage.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use minhash::{MinHasher, Signature};

use crate::backend::{BackendConfig, HasherMeta, LshBackend};
use crate::bands::BandProjection;
use crate::snapshot::CacheSnapshot;
use crate::{DocId, LshError, RESERVED_DOC_ID};

/// Similarity threshold used by [`Cache::is_duplicate`].
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.9;

/// Construction parameters for a [`Cache`].
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Number of bands the signature is split into. Must divide the
    /// hasher's signature length. More bands mean higher recall and lower
    /// precision.
    pub num_bands: usize,
    /// Storage backend selector.
    pub backend: BackendConfig,
    /// Also store raw document bodies so [`Cache::get_document`] works.
    pub cache_documents: bool,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_bands(mut self, num_bands: usize) -> Self {
        self.num_bands = num_bands;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_cache_documents(mut self, cache_documents: bool) -> Self {
        self.cache_documents = cache_documents;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), LshError> {
        if self.num_bands == 0 {
            return Err(LshError::config("num_bands must be >= 1"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_bands: 10,
            backend: BackendConfig::default(),
            cache_documents: false,
        }
    }
}

/// Near-duplicate index over MinHash signatures.
///
/// A `Cache` is exclusively owned by its creator; wrap it in a mutex (or
/// shard by id) for concurrent mutation. Read-only access after the last
/// mutation is safe to share.
pub struct Cache {
    hasher: MinHasher,
    projection: BandProjection,
    backend: Box<dyn LshBackend>,
    cache_documents: bool,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("num_seeds", &self.hasher.num_seeds())
            .field("num_bands", &self.projection.num_bands())
            .field("cache_documents", &self.cache_documents)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Build an index from a hasher and a configuration.
    ///
    /// Fails with a configuration error when the signature length is not
    /// divisible by `num_bands`, or when a durable backend file disagrees
    /// with the requested band count or hasher parameters.
    pub fn new(hasher: MinHasher, config: CacheConfig) -> Result<Self, LshError> {
        config.validate()?;
        let projection = BandProjection::new(hasher.num_seeds(), config.num_bands)?;
        let backend = config.backend.build(config.num_bands)?;
        reconcile_hasher_meta(&hasher, backend.as_ref())?;
        Ok(Self {
            hasher,
            projection,
            backend,
            cache_documents: config.cache_documents,
        })
    }

    /// Build an index over a caller-constructed backend.
    ///
    /// The band count is taken from the backend, which lets a durable file
    /// opened with the `-1` sentinel dictate its own banding.
    pub fn with_backend(
        hasher: MinHasher,
        backend: Box<dyn LshBackend>,
        cache_documents: bool,
    ) -> Result<Self, LshError> {
        let projection = BandProjection::new(hasher.num_seeds(), backend.num_bands())?;
        reconcile_hasher_meta(&hasher, backend.as_ref())?;
        Ok(Self {
            hasher,
            projection,
            backend,
            cache_documents,
        })
    }

    /// The fingerprinting engine this index was built with.
    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.projection.num_bands()
    }

    /// True iff the index holds no documents.
    pub fn is_empty(&self) -> Result<bool, LshError> {
        self.backend.is_empty()
    }

    /// Index a document under `doc_id`.
    ///
    /// Returns `false` (and emits an informational event) when the id is
    /// already present; the index is left untouched in that case.
    pub fn insert(&mut self, doc: &[u8], doc_id: DocId) -> Result<bool, LshError> {
        require_caller_id(doc_id)?;
        let signature = self.hasher.fingerprint(doc);
        let added = self.add_signature(&signature, doc_id)?;
        if added && self.cache_documents {
            self.backend.put_document(doc_id, doc)?;
        }
        Ok(added)
    }

    /// Index a precomputed signature under `doc_id` (import and snapshot
    /// restoration path). The signature length must match the hasher's.
    pub fn insert_signature(
        &mut self,
        signature: &Signature,
        doc_id: DocId,
    ) -> Result<bool, LshError> {
        require_caller_id(doc_id)?;
        self.add_signature(signature, doc_id)
    }

    fn add_signature(&mut self, signature: &Signature, doc_id: DocId) -> Result<bool, LshError> {
        let keys = self.projection.bucket_keys(signature)?;
        let added = self.backend.add(&keys, signature, doc_id)?;
        if !added {
            tracing::info!(doc_id, "document id already indexed; insert ignored");
        }
        Ok(added)
    }

    /// Every document sharing at least one bucket with `doc`.
    pub fn candidates_of(&self, doc: &[u8]) -> Result<BTreeSet<DocId>, LshError> {
        let signature = self.hasher.fingerprint(doc);
        let keys = self.projection.bucket_keys(&signature)?;
        let mut candidates = self.collect_candidates(&keys)?;
        candidates.remove(&RESERVED_DOC_ID);
        Ok(candidates)
    }

    /// Every document sharing at least one bucket with the already indexed
    /// document `doc_id` (itself excluded).
    pub fn candidates_of_id(&self, doc_id: DocId) -> Result<BTreeSet<DocId>, LshError> {
        require_caller_id(doc_id)?;
        let signature = self.backend.get_fingerprint(doc_id)?;
        let keys = self.projection.bucket_keys(&signature)?;
        let mut candidates = self.collect_candidates(&keys)?;
        candidates.remove(&doc_id);
        candidates.remove(&RESERVED_DOC_ID);
        Ok(candidates)
    }

    /// Indexed documents whose estimated Jaccard similarity with `doc`
    /// strictly exceeds `min_jaccard`.
    ///
    /// The document is indexed under the reserved sentinel id for the
    /// duration of the call and removed again on exit, so the lookup is
    /// stateless from the caller's perspective.
    pub fn duplicates_of(&mut self, doc: &[u8], min_jaccard: f64) -> Result<BTreeSet<DocId>, LshError> {
        // A crashed earlier call may have left the sentinel behind.
        self.backend.remove(RESERVED_DOC_ID)?;

        let signature = self.hasher.fingerprint(doc);
        let keys = self.projection.bucket_keys(&signature)?;
        self.backend.add(&keys, &signature, RESERVED_DOC_ID)?;
        let result = (|| {
            let mut candidates = self.collect_candidates(&keys)?;
            candidates.remove(&RESERVED_DOC_ID);
            self.filter_candidates(&signature, candidates, min_jaccard)
        })();
        self.backend.remove(RESERVED_DOC_ID)?;
        result
    }

    /// Indexed documents similar to the already indexed `doc_id` (itself
    /// excluded), refined by estimated Jaccard.
    pub fn duplicates_of_id(&self, doc_id: DocId, min_jaccard: f64) -> Result<BTreeSet<DocId>, LshError> {
        let signature = self.backend.get_fingerprint(doc_id)?;
        let keys = self.projection.bucket_keys(&signature)?;
        let mut candidates = self.collect_candidates(&keys)?;
        candidates.remove(&doc_id);
        candidates.remove(&RESERVED_DOC_ID);
        self.filter_candidates(&signature, candidates, min_jaccard)
    }

    /// Refine a candidate set by estimated Jaccard against `signature`.
    pub fn filter_candidates(
        &self,
        signature: &Signature,
        candidates: BTreeSet<DocId>,
        min_jaccard: f64,
    ) -> Result<BTreeSet<DocId>, LshError> {
        let total = candidates.len();
        let mut kept = BTreeSet::new();
        for doc_id in candidates {
            let other = self.backend.get_fingerprint(doc_id)?;
            if minhash::jaccard(signature, &other) > min_jaccard {
                kept.insert(doc_id);
            }
        }
        tracing::debug!(kept = kept.len(), total, "refined candidate set");
        Ok(kept)
    }

    /// Whether `doc` duplicates an already indexed document, at the
    /// default similarity threshold.
    pub fn is_duplicate(&self, doc: &[u8], doc_id: Option<DocId>) -> Result<bool, LshError> {
        self.is_duplicate_with(doc, doc_id, DEFAULT_MIN_SIMILARITY)
    }

    /// Whether `doc` duplicates an indexed document other than `doc_id`.
    ///
    /// An empty index never reports duplicates, and a document whose own
    /// id is already indexed is itself, not a duplicate. Short-circuits on
    /// the first candidate that clears the threshold.
    pub fn is_duplicate_with(
        &self,
        doc: &[u8],
        doc_id: Option<DocId>,
        min_similarity: f64,
    ) -> Result<bool, LshError> {
        if self.backend.is_empty()? {
            return Ok(false);
        }
        if let Some(id) = doc_id {
            if self.backend.doc_exists(id)? {
                return Ok(false);
            }
        }
        let signature = self.hasher.fingerprint(doc);
        let keys = self.projection.bucket_keys(&signature)?;
        let mut candidates = self.collect_candidates(&keys)?;
        candidates.remove(&RESERVED_DOC_ID);
        if let Some(id) = doc_id {
            candidates.remove(&id);
        }
        for candidate in candidates {
            let other = self.backend.get_fingerprint(candidate)?;
            if minhash::jaccard(&signature, &other) > min_similarity {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every unordered pair of documents sharing at least one bucket,
    /// optionally refined by estimated Jaccard.
    pub fn all_duplicate_pairs(
        &self,
        min_jaccard: Option<f64>,
    ) -> Result<BTreeSet<(DocId, DocId)>, LshError> {
        let mut pairs: BTreeSet<(DocId, DocId)> = BTreeSet::new();
        self.backend.scan_buckets(&mut |bucket| {
            if bucket.len() < 2 {
                return Ok(());
            }
            let members: Vec<DocId> = bucket.iter().copied().collect();
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    // Bucket iteration is ascending, so (a, b) is already
                    // the normalized orientation.
                    pairs.insert((a, b));
                }
            }
            Ok(())
        })?;

        let Some(threshold) = min_jaccard else {
            return Ok(pairs);
        };

        let total = pairs.len();
        let mut signatures: HashMap<DocId, Signature> = HashMap::new();
        let mut kept = BTreeSet::new();
        for (a, b) in pairs {
            if !signatures.contains_key(&a) {
                signatures.insert(a, self.backend.get_fingerprint(a)?);
            }
            if !signatures.contains_key(&b) {
                signatures.insert(b, self.backend.get_fingerprint(b)?);
            }
            if minhash::jaccard(&signatures[&a], &signatures[&b]) > threshold {
                kept.insert((a, b));
            }
        }
        tracing::info!(kept = kept.len(), total, "refined candidate pairs");
        Ok(kept)
    }

    /// Remove a document from every bucket and drop its signature. A
    /// no-op for unknown ids.
    pub fn remove(&mut self, doc_id: DocId) -> Result<(), LshError> {
        require_caller_id(doc_id)?;
        self.backend.remove(doc_id)
    }

    /// Wipe all indexed state, including the hasher's fingerprint memo.
    pub fn clear(&mut self) -> Result<(), LshError> {
        self.backend.clear()?;
        self.hasher.clear_memo();
        Ok(())
    }

    /// The raw body of an indexed document.
    ///
    /// Only available when the cache was built with `cache_documents`.
    pub fn get_document(&self, doc_id: DocId) -> Result<Vec<u8>, LshError> {
        if !self.cache_documents {
            return Err(LshError::NotCached);
        }
        self.backend
            .get_document(doc_id)?
            .ok_or(LshError::NotFound { doc_id })
    }

    /// Capture the full index state as a portable document.
    pub fn snapshot(&self) -> Result<CacheSnapshot, LshError> {
        let buckets = self
            .backend
            .buckets()?
            .into_iter()
            .map(|band| {
                band.into_iter()
                    .map(|(key, members)| (key, members.into_iter().collect()))
                    .collect()
            })
            .collect();
        let fingerprints = self.backend.fingerprints()?;
        let seen_ids = fingerprints.keys().copied().collect();
        Ok(CacheSnapshot {
            hasher: self.hasher.snapshot(),
            num_bands: self.projection.num_bands(),
            buckets,
            fingerprints,
            seen_ids,
        })
    }

    /// Rebuild an in-memory index from a snapshot.
    ///
    /// Bucket keys are a pure function of the signature, so re-adding the
    /// stored fingerprints reproduces the serialized bucket membership
    /// exactly.
    pub fn restore(snapshot: CacheSnapshot) -> Result<Self, LshError> {
        let hasher = MinHasher::from_snapshot(snapshot.hasher)
            .map_err(|e| LshError::config(e.to_string()))?;
        let mut cache = Cache::new(
            hasher,
            CacheConfig::new().with_num_bands(snapshot.num_bands),
        )?;
        for (doc_id, signature) in &snapshot.fingerprints {
            let keys = cache.projection.bucket_keys(signature)?;
            cache.backend.add(&keys, signature, *doc_id)?;
        }
        Ok(cache)
    }

    /// Write a snapshot to a JSON file.
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), LshError> {
        let snapshot = self.snapshot()?;
        let file = File::create(path.as_ref()).map_err(LshError::backend)?;
        serde_json::to_writer(BufWriter::new(file), &snapshot).map_err(LshError::backend)?;
        tracing::info!(path = %path.as_ref().display(), documents = snapshot.seen_ids.len(), "wrote index snapshot");
        Ok(())
    }

    /// Rebuild an in-memory index from a JSON snapshot file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, LshError> {
        let file = File::open(path.as_ref()).map_err(LshError::backend)?;
        let snapshot: CacheSnapshot =
            serde_json::from_reader(BufReader::new(file)).map_err(LshError::backend)?;
        tracing::info!(path = %path.as_ref().display(), documents = snapshot.seen_ids.len(), "read index snapshot");
        Self::restore(snapshot)
    }

    fn collect_candidates(&self, keys: &[(usize, u64)]) -> Result<BTreeSet<DocId>, LshError> {
        let mut candidates = BTreeSet::new();
        for &(band, bucket) in keys {
            candidates.extend(self.backend.get_bucket(band, bucket)?);
        }
        Ok(candidates)
    }
}

fn require_caller_id(doc_id: DocId) -> Result<(), LshError> {
    if doc_id == RESERVED_DOC_ID {
        return Err(LshError::argument(format!(
            "doc_id {RESERVED_DOC_ID} is reserved for internal use"
        )));
    }
    Ok(())
}

fn reconcile_hasher_meta(hasher: &MinHasher, backend: &dyn LshBackend) -> Result<(), LshError> {
    match backend.hasher_meta()? {
        Some(meta) => {
            if meta.seeds != hasher.seeds() || meta.ngram_width != hasher.char_ngram() {
                return Err(LshError::config(
                    "index file was built with different hasher parameters",
                ));
            }
            Ok(())
        }
        None => backend.put_hasher_meta(&HasherMeta {
            num_seeds: hasher.num_seeds(),
            ngram_width: hasher.char_ngram(),
            seeds: hasher.seeds().to_vec(),
        }),
    }
}
