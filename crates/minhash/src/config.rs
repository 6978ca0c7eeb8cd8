//! Configuration and error types for MinHash fingerprinting.
//!
//! The hasher is a pure function of `(document bytes, config)`; nothing in
//! this module touches I/O or process state. Two configs with the same
//! `random_state` (and all other parameters equal) produce bit-identical
//! fingerprints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default seed for the reproducible seed-vector derivation.
pub const DEFAULT_RANDOM_STATE: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Configuration for a [`crate::MinHasher`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MinHasherConfig {
    /// Number of hash lanes in the signature (the signature length).
    ///
    /// More lanes reduce the variance of the Jaccard estimate at a linear
    /// cost in hashing time and storage.
    pub num_seeds: usize,
    /// Width in bytes of the sliding shingle window. Larger windows are
    /// more selective; smaller windows are more tolerant to edits.
    pub char_ngram: usize,
    /// Seed for the deterministic derivation of the per-lane hash seeds.
    pub random_state: u64,
    /// Compute signature lanes in parallel with rayon.
    pub use_parallel: bool,
    /// Remember recent fingerprints in a bounded LRU keyed by the
    /// document bytes. Worth enabling when the same document is hashed
    /// repeatedly (query-then-insert workloads).
    pub memoize: bool,
    /// Capacity of the fingerprint memo when `memoize` is on.
    pub memo_capacity: usize,
}

impl MinHasherConfig {
    /// Create a configuration with the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signature length. Typical values: 100-400.
    pub fn with_num_seeds(mut self, num_seeds: usize) -> Self {
        self.num_seeds = num_seeds;
        self
    }

    /// Set the shingle window width in bytes.
    pub fn with_char_ngram(mut self, char_ngram: usize) -> Self {
        self.char_ngram = char_ngram;
        self
    }

    /// Set the seed for reproducible seed-vector derivation.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Enable or disable parallel lane computation.
    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Enable or disable the fingerprint memo.
    pub fn with_memoize(mut self, memoize: bool) -> Self {
        self.memoize = memoize;
        self
    }

    /// Set the memo capacity (entries, not bytes).
    pub fn with_memo_capacity(mut self, memo_capacity: usize) -> Self {
        self.memo_capacity = memo_capacity;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), MinHashError> {
        if self.num_seeds == 0 {
            return Err(MinHashError::InvalidNumSeeds {
                num_seeds: self.num_seeds,
            });
        }
        if self.char_ngram == 0 {
            return Err(MinHashError::InvalidCharNgram {
                char_ngram: self.char_ngram,
            });
        }
        if self.memoize && self.memo_capacity == 0 {
            return Err(MinHashError::InvalidMemoCapacity);
        }
        Ok(())
    }
}

impl Default for MinHasherConfig {
    fn default() -> Self {
        Self {
            num_seeds: 100,
            char_ngram: 8,
            random_state: DEFAULT_RANDOM_STATE,
            use_parallel: false,
            memoize: false,
            memo_capacity: 1024,
        }
    }
}

/// Errors raised when constructing a hasher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MinHashError {
    #[error("invalid config: num_seeds must be >= 1 (got {num_seeds})")]
    InvalidNumSeeds { num_seeds: usize },

    #[error("invalid config: char_ngram must be >= 1 (got {char_ngram})")]
    InvalidCharNgram { char_ngram: usize },

    #[error("invalid config: memo_capacity must be >= 1 when memoize is enabled")]
    InvalidMemoCapacity,

    #[error("seed vector must not be empty")]
    EmptySeeds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = MinHasherConfig::default();
        assert_eq!(cfg.num_seeds, 100);
        assert_eq!(cfg.char_ngram, 8);
        assert_eq!(cfg.random_state, DEFAULT_RANDOM_STATE);
        assert!(!cfg.use_parallel);
        assert!(!cfg.memoize);
        assert_eq!(cfg.memo_capacity, 1024);
    }

    #[test]
    fn builder_chain() {
        let cfg = MinHasherConfig::new()
            .with_num_seeds(200)
            .with_char_ngram(5)
            .with_random_state(42)
            .with_parallel(true)
            .with_memoize(true)
            .with_memo_capacity(64);

        assert_eq!(cfg.num_seeds, 200);
        assert_eq!(cfg.char_ngram, 5);
        assert_eq!(cfg.random_state, 42);
        assert!(cfg.use_parallel);
        assert!(cfg.memoize);
        assert_eq!(cfg.memo_capacity, 64);
    }

    #[test]
    fn validate_rejects_zero_seeds() {
        let cfg = MinHasherConfig::new().with_num_seeds(0);
        assert!(matches!(
            cfg.validate(),
            Err(MinHashError::InvalidNumSeeds { num_seeds: 0 })
        ));
    }

    #[test]
    fn validate_rejects_zero_ngram() {
        let cfg = MinHasherConfig::new().with_char_ngram(0);
        assert!(matches!(
            cfg.validate(),
            Err(MinHashError::InvalidCharNgram { char_ngram: 0 })
        ));
    }

    #[test]
    fn validate_rejects_zero_memo_capacity_only_when_memoizing() {
        let cfg = MinHasherConfig::new().with_memo_capacity(0);
        assert!(cfg.validate().is_ok());

        let cfg = cfg.with_memoize(true);
        assert!(matches!(
            cfg.validate(),
            Err(MinHashError::InvalidMemoCapacity)
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = MinHasherConfig::new().with_num_seeds(32).with_random_state(7);
        let serialized = serde_json::to_string(&cfg).unwrap();
        let deserialized: MinHasherConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }
}
