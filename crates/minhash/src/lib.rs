//! # MinHash fingerprinting
//!
//! Deterministic, seed-driven MinHash signatures over the character n-gram
//! shingles of a byte document, plus the positionwise Jaccard estimator.
//! This crate is the numeric core of the near-duplicate pipeline: the
//! banded index in `neardup-lsh` consumes the signatures produced here and
//! relies on them being bit-exact across runs, platforms, and releases.
//!
//! ## Contract
//!
//! - [`MinHasher::fingerprint`] is a pure function of
//!   `(document bytes, seed vector, char_ngram)`. No I/O, no clocks, no
//!   global state.
//! - Lane seeds derive from a single `random_state` through a locked
//!   splitmix64 stream, or are supplied explicitly.
//! - [`jaccard`] estimates set similarity as the fraction of signature
//!   lanes on which two signatures agree.
//!
//! ## Example
//!
//! ```
//! use minhash::{MinHasher, MinHasherConfig};
//!
//! let hasher = MinHasher::new(
//!     MinHasherConfig::new()
//!         .with_num_seeds(200)
//!         .with_char_ngram(5)
//!         .with_random_state(42),
//! )
//! .unwrap();
//!
//! let a = hasher.fingerprint(b"This is a simple document");
//! let b = hasher.fingerprint(b"This is a simple document");
//! assert_eq!(a, b);
//! assert_eq!(minhash::jaccard(&a, &b), 1.0);
//! ```

pub mod config;
mod hasher;
mod murmur;

pub use crate::config::{MinHashError, MinHasherConfig, DEFAULT_RANDOM_STATE};
pub use crate::hasher::{jaccard, HasherSnapshot, MinHasher, Signature};
pub use crate::murmur::murmur3_x86_32;
