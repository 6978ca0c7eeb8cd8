//! YAML configuration file support.
//!
//! Deployments describe the whole dedup pipeline — hasher parameters and
//! index parameters — in one YAML file and load it at runtime instead of
//! wiring builders by hand.
//!
//! ## Example YAML configuration
//!
//! ```yaml
//! hasher:
//!   num_seeds: 200
//!   char_ngram: 8
//!   random_state: 42
//!   use_parallel: false
//!   memoize: true
//!
//! index:
//!   num_bands: 50
//!   backend: "memory"        # or "sqlite"
//!   path: "neardup.sqlite"   # required for the sqlite backend
//!   cache_documents: false
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lsh::{BackendConfig, Cache, CacheConfig, LshError};
use minhash::{MinHashError, MinHasher, MinHasherConfig};

/// Errors that can occur when loading a YAML configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("unknown backend selector {0:?}; expected \"memory\" or \"sqlite\"")]
    UnknownBackend(String),

    #[error("the sqlite backend requires a path")]
    MissingPath,

    #[error(transparent)]
    Hasher(#[from] MinHashError),

    #[error(transparent)]
    Index(#[from] LshError),
}

/// `hasher:` section. Mirrors [`MinHasherConfig`] with the same defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherSection {
    pub num_seeds: usize,
    pub char_ngram: usize,
    pub random_state: u64,
    pub use_parallel: bool,
    pub memoize: bool,
    pub memo_capacity: usize,
}

impl Default for HasherSection {
    fn default() -> Self {
        let cfg = MinHasherConfig::default();
        Self {
            num_seeds: cfg.num_seeds,
            char_ngram: cfg.char_ngram,
            random_state: cfg.random_state,
            use_parallel: cfg.use_parallel,
            memoize: cfg.memoize,
            memo_capacity: cfg.memo_capacity,
        }
    }
}

impl HasherSection {
    fn to_config(&self) -> MinHasherConfig {
        MinHasherConfig::new()
            .with_num_seeds(self.num_seeds)
            .with_char_ngram(self.char_ngram)
            .with_random_state(self.random_state)
            .with_parallel(self.use_parallel)
            .with_memoize(self.memoize)
            .with_memo_capacity(self.memo_capacity)
    }
}

/// `index:` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub num_bands: usize,
    /// Backend selector: `"memory"` or `"sqlite"`.
    pub backend: String,
    /// File path for the sqlite backend.
    pub path: Option<String>,
    pub cache_documents: bool,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            num_bands: CacheConfig::default().num_bands,
            backend: "memory".to_string(),
            path: None,
            cache_documents: false,
        }
    }
}

impl IndexSection {
    fn backend_config(&self) -> Result<BackendConfig, ConfigLoadError> {
        match self.backend.as_str() {
            "memory" => Ok(BackendConfig::in_memory()),
            "sqlite" => {
                let path = self.path.as_ref().ok_or(ConfigLoadError::MissingPath)?;
                Ok(BackendConfig::sqlite(path))
            }
            other => Err(ConfigLoadError::UnknownBackend(other.to_string())),
        }
    }
}

/// Top-level configuration for the dedup pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub hasher: HasherSection,
    pub index: IndexSection,
}

impl DedupConfig {
    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Build the configured hasher.
    pub fn build_hasher(&self) -> Result<MinHasher, ConfigLoadError> {
        Ok(MinHasher::new(self.hasher.to_config())?)
    }

    /// Build the fully wired index.
    pub fn build_cache(&self) -> Result<Cache, ConfigLoadError> {
        let hasher = self.build_hasher()?;
        let cache_config = CacheConfig::new()
            .with_num_bands(self.index.num_bands)
            .with_backend(self.index.backend_config()?)
            .with_cache_documents(self.index.cache_documents);
        Ok(Cache::new(hasher, cache_config)?)
    }
}
