//! In-memory backend: per-band bucket maps plus a global fingerprint map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use minhash::Signature;

use crate::backend::LshBackend;
use crate::{DocId, LshError};

#[derive(Default)]
struct MemoryState {
    /// One `bucket_key -> {doc_id}` map per band.
    buckets: Vec<HashMap<u64, BTreeSet<DocId>>>,
    /// Reverse index so `remove` does not have to scan every bucket.
    memberships: HashMap<DocId, Vec<(usize, u64)>>,
    fingerprints: HashMap<DocId, Signature>,
    documents: HashMap<DocId, Vec<u8>>,
}

/// An ephemeral backend backed by a `RwLock` around plain maps.
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    num_bands: usize,
}

impl MemoryBackend {
    pub fn new(num_bands: usize) -> Result<Self, LshError> {
        if num_bands == 0 {
            return Err(LshError::config("num_bands must be >= 1"));
        }
        Ok(Self {
            state: RwLock::new(MemoryState {
                buckets: (0..num_bands).map(|_| HashMap::new()).collect(),
                ..MemoryState::default()
            }),
            num_bands,
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, LshError> {
        self.state
            .read()
            .map_err(|_| LshError::backend("poisoned lock"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, LshError> {
        self.state
            .write()
            .map_err(|_| LshError::backend("poisoned lock"))
    }
}

impl LshBackend for MemoryBackend {
    fn num_bands(&self) -> usize {
        self.num_bands
    }

    fn is_empty(&self) -> Result<bool, LshError> {
        Ok(self.read()?.fingerprints.is_empty())
    }

    fn add(
        &self,
        bucket_keys: &[(usize, u64)],
        signature: &Signature,
        doc_id: DocId,
    ) -> Result<bool, LshError> {
        let mut state = self.write()?;
        if state.fingerprints.contains_key(&doc_id) {
            return Ok(false);
        }
        // Validate before the first mutation so a bad call leaves no
        // partial state behind.
        for &(band, _) in bucket_keys {
            if band >= self.num_bands {
                return Err(LshError::argument(format!(
                    "band index {band} out of range for {} bands",
                    self.num_bands
                )));
            }
        }
        for &(band, bucket) in bucket_keys {
            state.buckets[band].entry(bucket).or_default().insert(doc_id);
        }
        state.memberships.insert(doc_id, bucket_keys.to_vec());
        state.fingerprints.insert(doc_id, signature.clone());
        Ok(true)
    }

    fn get_fingerprint(&self, doc_id: DocId) -> Result<Signature, LshError> {
        self.read()?
            .fingerprints
            .get(&doc_id)
            .cloned()
            .ok_or(LshError::NotFound { doc_id })
    }

    fn get_bucket(&self, band: usize, bucket: u64) -> Result<BTreeSet<DocId>, LshError> {
        let state = self.read()?;
        Ok(state
            .buckets
            .get(band)
            .and_then(|b| b.get(&bucket))
            .cloned()
            .unwrap_or_default())
    }

    fn scan_buckets(
        &self,
        visitor: &mut dyn FnMut(&BTreeSet<DocId>) -> Result<(), LshError>,
    ) -> Result<(), LshError> {
        let state = self.read()?;
        for band in &state.buckets {
            for bucket in band.values() {
                visitor(bucket)?;
            }
        }
        Ok(())
    }

    fn buckets(&self) -> Result<Vec<BTreeMap<u64, BTreeSet<DocId>>>, LshError> {
        let state = self.read()?;
        Ok(state
            .buckets
            .iter()
            .map(|band| band.iter().map(|(k, v)| (*k, v.clone())).collect())
            .collect())
    }

    fn fingerprints(&self) -> Result<BTreeMap<DocId, Signature>, LshError> {
        let state = self.read()?;
        Ok(state
            .fingerprints
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn remove(&self, doc_id: DocId) -> Result<(), LshError> {
        let mut state = self.write()?;
        let Some(memberships) = state.memberships.remove(&doc_id) else {
            return Ok(());
        };
        for (band, bucket) in memberships {
            let empty = {
                let Some(members) = state.buckets[band].get_mut(&bucket) else {
                    continue;
                };
                members.remove(&doc_id);
                members.is_empty()
            };
            // Invariant: empty buckets are never materialized.
            if empty {
                state.buckets[band].remove(&bucket);
            }
        }
        state.fingerprints.remove(&doc_id);
        state.documents.remove(&doc_id);
        Ok(())
    }

    fn clear(&self) -> Result<(), LshError> {
        let mut state = self.write()?;
        state.buckets = (0..self.num_bands).map(|_| HashMap::new()).collect();
        state.memberships.clear();
        state.fingerprints.clear();
        state.documents.clear();
        Ok(())
    }

    fn doc_exists(&self, doc_id: DocId) -> Result<bool, LshError> {
        Ok(self.read()?.fingerprints.contains_key(&doc_id))
    }

    fn put_document(&self, doc_id: DocId, content: &[u8]) -> Result<(), LshError> {
        self.write()?.documents.insert(doc_id, content.to_vec());
        Ok(())
    }

    fn get_document(&self, doc_id: DocId) -> Result<Option<Vec<u8>>, LshError> {
        Ok(self.read()?.documents.get(&doc_id).cloned())
    }
}
