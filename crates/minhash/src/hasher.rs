//! MinHash signature computation.
//!
//! A [`MinHasher`] turns a byte document into a fixed-length signature: for
//! each of `num_seeds` hash lanes the signature holds the minimum
//! [`murmur3_x86_32`] value over every `char_ngram`-byte sliding window of
//! the document. The fraction of lanes on which two signatures agree is an
//! unbiased estimator of the Jaccard similarity of the two documents'
//! shingle sets.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{MinHashError, MinHasherConfig};
use crate::murmur::murmur3_x86_32;

/// A MinHash signature: one 32-bit minimum per hash lane.
pub type Signature = Vec<u32>;

/// Per-lane seeds are drawn from `[0, SEED_DRAW_RANGE)`.
const SEED_DRAW_RANGE: u64 = 1_000_000;

/// splitmix64 finalizer. Locked: the seed vector derived from a given
/// `random_state` must never change between releases, or stored
/// fingerprints stop matching freshly computed ones.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derive the lane seed vector from a single `random_state`.
///
/// Lane `j` uses `splitmix64(random_state + j * gamma) mod 1_000_000`,
/// truncated to 32 bits. The modulo keeps the seeds in the same numeric
/// range historical fingerprint corpora were built with.
fn derive_seeds(num_seeds: usize, random_state: u64) -> Vec<u32> {
    (0..num_seeds)
        .map(|j| {
            let step = (j as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            (splitmix64(random_state.wrapping_add(step)) % SEED_DRAW_RANGE) as u32
        })
        .collect()
}

/// Positionwise signature agreement: `|{i : a[i] == b[i]}| / len`.
///
/// Returns 0.0 for empty or length-mismatched inputs. Commutative, and
/// 1.0 exactly when the signatures are elementwise equal.
pub fn jaccard(a: &[u32], b: &[u32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let agree = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    agree as f64 / a.len() as f64
}

/// Serializable description of a hasher, sufficient to reproduce its
/// fingerprints bit-exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HasherSnapshot {
    /// The full per-lane seed vector (not the `random_state` it may have
    /// been derived from, so explicitly seeded hashers round-trip too).
    pub seeds: Vec<u32>,
    /// Shingle window width in bytes.
    pub char_ngram: usize,
}

/// Bounded LRU of `document bytes -> signature`.
///
/// Recency is tracked with an order queue; the memo is small (hundreds of
/// entries) so the linear reorder on hit is not worth a fancier structure.
struct FingerprintMemo {
    capacity: usize,
    entries: HashMap<Vec<u8>, Signature>,
    order: VecDeque<Vec<u8>>,
}

impl FingerprintMemo {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, doc: &[u8]) -> Option<Signature> {
        let sig = self.entries.get(doc)?.clone();
        self.touch(doc);
        Some(sig)
    }

    fn touch(&mut self, doc: &[u8]) {
        if let Some(pos) = self.order.iter().position(|k| k.as_slice() == doc) {
            if let Some(key) = self.order.remove(pos) {
                self.order.push_back(key);
            }
        }
    }

    fn put(&mut self, doc: Vec<u8>, sig: Signature) {
        if self.entries.contains_key(&doc) {
            self.touch(&doc);
            self.entries.insert(doc, sig);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(doc.clone());
        self.entries.insert(doc, sig);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Deterministic MinHash fingerprinting engine.
///
/// Invariant: for the same document bytes and the same seed vector and
/// window width, [`MinHasher::fingerprint`] is bit-identical across runs
/// and platforms.
pub struct MinHasher {
    seeds: Vec<u32>,
    char_ngram: usize,
    use_parallel: bool,
    memo: Option<Mutex<FingerprintMemo>>,
}

impl MinHasher {
    /// Build a hasher from a configuration, deriving the seed vector from
    /// `random_state`.
    pub fn new(cfg: MinHasherConfig) -> Result<Self, MinHashError> {
        cfg.validate()?;
        let seeds = derive_seeds(cfg.num_seeds, cfg.random_state);
        Self::from_parts(seeds, cfg.char_ngram, cfg.use_parallel, cfg.memoize.then_some(cfg.memo_capacity))
    }

    /// Build a hasher from an explicit seed vector.
    pub fn with_seeds(seeds: Vec<u32>, char_ngram: usize) -> Result<Self, MinHashError> {
        Self::from_parts(seeds, char_ngram, false, None)
    }

    fn from_parts(
        seeds: Vec<u32>,
        char_ngram: usize,
        use_parallel: bool,
        memo_capacity: Option<usize>,
    ) -> Result<Self, MinHashError> {
        if seeds.is_empty() {
            return Err(MinHashError::EmptySeeds);
        }
        if char_ngram == 0 {
            return Err(MinHashError::InvalidCharNgram { char_ngram });
        }
        Ok(Self {
            seeds,
            char_ngram,
            use_parallel,
            memo: memo_capacity.map(|cap| Mutex::new(FingerprintMemo::new(cap))),
        })
    }

    /// Signature length (number of hash lanes).
    pub fn num_seeds(&self) -> usize {
        self.seeds.len()
    }

    /// Shingle window width in bytes.
    pub fn char_ngram(&self) -> usize {
        self.char_ngram
    }

    /// The per-lane seed vector.
    pub fn seeds(&self) -> &[u32] {
        &self.seeds
    }

    /// Compute the MinHash signature of a document.
    ///
    /// Windowing policy: a document of `L` bytes yields `L - char_ngram + 1`
    /// shingles. A non-empty document shorter than the window is hashed as
    /// a single whole-document shingle; the empty document has no shingles
    /// and every lane stays at `u32::MAX`.
    pub fn fingerprint(&self, doc: &[u8]) -> Signature {
        if let Some(memo) = &self.memo {
            let mut memo = memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(sig) = memo.get(doc) {
                return sig;
            }
            let sig = self.fingerprint_uncached(doc);
            memo.put(doc.to_vec(), sig.clone());
            return sig;
        }
        self.fingerprint_uncached(doc)
    }

    fn fingerprint_uncached(&self, doc: &[u8]) -> Signature {
        if self.use_parallel {
            self.seeds
                .par_iter()
                .map(|&seed| lane_min(doc, self.char_ngram, seed))
                .collect()
        } else {
            self.seeds
                .iter()
                .map(|&seed| lane_min(doc, self.char_ngram, seed))
                .collect()
        }
    }

    /// Estimate the Jaccard similarity of two raw documents.
    pub fn similarity(&self, a: &[u8], b: &[u8]) -> f64 {
        jaccard(&self.fingerprint(a), &self.fingerprint(b))
    }

    /// Estimate Jaccard similarity from two signatures.
    pub fn jaccard(&self, a: &[u32], b: &[u32]) -> f64 {
        jaccard(a, b)
    }

    /// Drop every memoized fingerprint.
    pub fn clear_memo(&self) {
        if let Some(memo) = &self.memo {
            memo.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
    }

    /// Number of memoized fingerprints (0 when memoization is off).
    pub fn memo_len(&self) -> usize {
        self.memo
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len())
            .unwrap_or(0)
    }

    /// Capture the hasher parameters for serialization.
    pub fn snapshot(&self) -> HasherSnapshot {
        HasherSnapshot {
            seeds: self.seeds.clone(),
            char_ngram: self.char_ngram,
        }
    }

    /// Rebuild a hasher from a snapshot. The restored hasher reproduces
    /// the original's fingerprints exactly; runtime knobs (parallelism,
    /// memoization) reset to their defaults.
    pub fn from_snapshot(snapshot: HasherSnapshot) -> Result<Self, MinHashError> {
        Self::with_seeds(snapshot.seeds, snapshot.char_ngram)
    }
}

/// Minimum shingle hash for one lane.
#[inline]
fn lane_min(doc: &[u8], char_ngram: usize, seed: u32) -> u32 {
    if doc.is_empty() {
        return u32::MAX;
    }
    if doc.len() < char_ngram {
        return murmur3_x86_32(doc, seed);
    }
    let mut min = u32::MAX;
    for window in doc.windows(char_ngram) {
        let h = murmur3_x86_32(window, seed);
        if h < min {
            min = h;
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(num_seeds: usize, char_ngram: usize, random_state: u64) -> MinHasher {
        MinHasher::new(
            MinHasherConfig::new()
                .with_num_seeds(num_seeds)
                .with_char_ngram(char_ngram)
                .with_random_state(random_state),
        )
        .expect("valid config")
    }

    #[test]
    fn seed_derivation_is_stable() {
        let a = derive_seeds(16, 42);
        let b = derive_seeds(16, 42);
        assert_eq!(a, b);
        assert!(a.iter().all(|&s| u64::from(s) < SEED_DRAW_RANGE));

        let c = derive_seeds(16, 43);
        assert_ne!(a, c);
    }

    #[test]
    fn derivation_is_a_prefix_stream() {
        // Growing the lane count must not disturb the existing lanes.
        let short = derive_seeds(8, 42);
        let long = derive_seeds(32, 42);
        assert_eq!(short[..], long[..8]);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let h = hasher(64, 4, 7);
        let doc = b"determinism is the whole point of this module";
        assert_eq!(h.fingerprint(doc), h.fingerprint(doc));

        let twin = hasher(64, 4, 7);
        assert_eq!(h.fingerprint(doc), twin.fingerprint(doc));
    }

    #[test]
    fn fingerprint_length_matches_seed_count() {
        let h = hasher(33, 4, 1);
        assert_eq!(h.fingerprint(b"some document").len(), 33);
    }

    #[test]
    fn parallel_matches_sequential() {
        let doc = b"the parallel path must agree with the sequential path";
        let seq = hasher(64, 5, 9);
        let par = MinHasher::new(
            MinHasherConfig::new()
                .with_num_seeds(64)
                .with_char_ngram(5)
                .with_random_state(9)
                .with_parallel(true),
        )
        .unwrap();
        assert_eq!(seq.fingerprint(doc), par.fingerprint(doc));
    }

    #[test]
    fn empty_document_saturates_lanes() {
        let h = hasher(8, 4, 3);
        assert!(h.fingerprint(b"").iter().all(|&v| v == u32::MAX));
    }

    #[test]
    fn short_document_hashes_whole_body() {
        let h = hasher(8, 16, 3);
        let doc = b"tiny";
        let expected: Vec<u32> = h
            .seeds()
            .iter()
            .map(|&s| crate::murmur::murmur3_x86_32(doc, s))
            .collect();
        assert_eq!(h.fingerprint(doc), expected);
    }

    #[test]
    fn jaccard_reflexive_and_commutative() {
        let h = hasher(128, 4, 5);
        let a = h.fingerprint(b"one document about hashing");
        let b = h.fingerprint(b"another document about hashing");
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        let j = jaccard(&a, &b);
        assert!((0.0..=1.0).contains(&j));
    }

    #[test]
    fn jaccard_mismatched_lengths_is_zero() {
        assert_eq!(jaccard(&[1, 2, 3], &[1, 2]), 0.0);
        assert_eq!(jaccard(&[], &[]), 0.0);
    }

    #[test]
    fn similar_documents_score_higher() {
        let h = hasher(256, 3, 11);
        let base = b"This is a doc";
        let close = b"That is a doc";
        let far = b"Cats in a tree";
        let close_sim = h.similarity(base, close);
        let far_sim = h.similarity(base, far);
        assert_eq!(h.similarity(base, base), 1.0);
        assert!(far_sim < close_sim);
        assert!(close_sim < 1.0);
    }

    #[test]
    fn explicit_seeds_round_trip_via_snapshot() {
        let h = MinHasher::with_seeds(vec![3, 1, 4, 1, 5, 9, 2, 6], 4).unwrap();
        let doc = b"snapshots must reproduce fingerprints";
        let snap = h.snapshot();

        let json = serde_json::to_string(&snap).unwrap();
        let decoded: HasherSnapshot = serde_json::from_str(&json).unwrap();
        let restored = MinHasher::from_snapshot(decoded).unwrap();

        assert_eq!(h.fingerprint(doc), restored.fingerprint(doc));
        assert_eq!(restored.num_seeds(), 8);
        assert_eq!(restored.char_ngram(), 4);
    }

    #[test]
    fn with_seeds_rejects_empty_vector() {
        assert!(matches!(
            MinHasher::with_seeds(Vec::new(), 4),
            Err(MinHashError::EmptySeeds)
        ));
    }

    #[test]
    fn memo_returns_cached_signature() {
        let h = MinHasher::new(
            MinHasherConfig::new()
                .with_num_seeds(16)
                .with_char_ngram(4)
                .with_memoize(true)
                .with_memo_capacity(2),
        )
        .unwrap();

        let first = h.fingerprint(b"document one");
        assert_eq!(h.memo_len(), 1);
        assert_eq!(h.fingerprint(b"document one"), first);
        assert_eq!(h.memo_len(), 1);
    }

    #[test]
    fn memo_evicts_least_recently_used() {
        let h = MinHasher::new(
            MinHasherConfig::new()
                .with_num_seeds(8)
                .with_char_ngram(4)
                .with_memoize(true)
                .with_memo_capacity(2),
        )
        .unwrap();

        h.fingerprint(b"aaaa first");
        h.fingerprint(b"bbbb second");
        // Touch the first entry so the second becomes the eviction victim.
        h.fingerprint(b"aaaa first");
        h.fingerprint(b"cccc third");
        assert_eq!(h.memo_len(), 2);

        h.clear_memo();
        assert_eq!(h.memo_len(), 0);
    }
}
