//! Band splitting and bucket-key derivation.
//!
//! A signature of length K is cut into `num_bands` contiguous slices of
//! width `K / num_bands`. Each slice is reduced to a 64-bit bucket key by
//! hashing the little-endian bytes of its entries with xxh3 under a fixed
//! seed. Two signatures receive the same key for a band exactly when every
//! entry of that band agrees (modulo 64-bit hash collisions), and the
//! mapping is identical across runs and platforms.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use minhash::Signature;

use crate::LshError;

/// Fixed key-mixing seed. Part of the on-disk and snapshot contract; a
/// change invalidates every persisted bucket key.
const BUCKET_KEY_SEED: u64 = 0x1D0C_5EED_BA5E_B411;

/// Splits signatures into bands and derives their bucket keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandProjection {
    signature_len: usize,
    num_bands: usize,
    band_width: usize,
}

impl BandProjection {
    /// Build a projection for signatures of `signature_len` entries.
    ///
    /// The band count must be positive and divide the signature length.
    pub fn new(signature_len: usize, num_bands: usize) -> Result<Self, LshError> {
        if num_bands == 0 {
            return Err(LshError::config("num_bands must be >= 1"));
        }
        if signature_len == 0 {
            return Err(LshError::config("signature length must be >= 1"));
        }
        if signature_len % num_bands != 0 {
            return Err(LshError::config(format!(
                "signature length {signature_len} is not divisible by num_bands {num_bands}"
            )));
        }
        Ok(Self {
            signature_len,
            num_bands,
            band_width: signature_len / num_bands,
        })
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn band_width(&self) -> usize {
        self.band_width
    }

    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    /// Derive the ordered `(band_index, bucket_key)` sequence for a
    /// signature.
    pub fn bucket_keys(&self, signature: &Signature) -> Result<Vec<(usize, u64)>, LshError> {
        if signature.len() != self.signature_len {
            return Err(LshError::argument(format!(
                "signature has {} entries, expected {}",
                signature.len(),
                self.signature_len
            )));
        }
        Ok(signature
            .chunks_exact(self.band_width)
            .enumerate()
            .map(|(band, slice)| (band, bucket_key(slice)))
            .collect())
    }
}

/// Hash one band slice to its bucket key.
#[inline]
fn bucket_key(band: &[u32]) -> u64 {
    let mut bytes = Vec::with_capacity(band.len() * 4);
    for entry in band {
        bytes.extend_from_slice(&entry.to_le_bytes());
    }
    xxh3_64_with_seed(&bytes, BUCKET_KEY_SEED)
}
