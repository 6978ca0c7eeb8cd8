//! Durable single-file backend over sqlite.
//!
//! One `data` table carries both kinds of rows: B bucket-membership rows
//! `(band_id, bucket_id, doc_id, NULL, NULL)` and K signature rows
//! `(NULL, NULL, doc_id, sig_word, sig_position)` per document, so each
//! signature word is stored once rather than once per band. A single
//! `meta` row makes the file self-describing: schema version, band count,
//! and the hasher parameters (seed vector as a little-endian blob).
//!
//! The backend holds one connection for its lifetime. `add`, `remove`,
//! and `clear` each run inside a transaction; a failed transaction rolls
//! back and the error surfaces verbatim as [`LshError::Backend`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use minhash::Signature;

use crate::backend::{HasherMeta, LshBackend};
use crate::{DocId, LshError};

/// Bump when the row layout changes. Version 2 is the normalized layout
/// (signature words stored once, membership rows per band).
pub const SCHEMA_VERSION: i64 = 2;

/// Durable backend owning a sqlite file.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: PathBuf,
    num_bands: usize,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("num_bands", &self.num_bands)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open or create the index file at `path`.
    ///
    /// A new file stores `num_bands` in its meta row; reopening an
    /// existing file checks the stored count against `num_bands` and fails
    /// on a positive mismatch. Pass `-1` to adopt whatever the file has.
    pub fn open<P: AsRef<Path>>(path: P, num_bands: i64) -> Result<Self, LshError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(LshError::backend)?;
            }
        }

        let conn = Connection::open(&path).map_err(LshError::backend)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(LshError::backend)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                schema_version INTEGER NOT NULL,
                num_bands INTEGER NOT NULL,
                num_seeds INTEGER,
                ngram_width INTEGER,
                seeds BLOB
            );
            CREATE TABLE IF NOT EXISTS data (
                band_id INTEGER,
                bucket_id INTEGER,
                doc_id INTEGER NOT NULL,
                sig_word INTEGER,
                sig_position INTEGER
            );
            CREATE INDEX IF NOT EXISTS bands ON data (band_id, bucket_id);
            CREATE INDEX IF NOT EXISTS docs ON data (doc_id);
            CREATE TABLE IF NOT EXISTS documents (
                doc_id INTEGER PRIMARY KEY,
                content BLOB NOT NULL
            );
            ",
        )
        .map_err(LshError::backend)?;

        let stored: Option<(i64, i64)> = conn
            .query_row(
                "SELECT schema_version, num_bands FROM meta WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(LshError::backend)?;

        let resolved = match stored {
            Some((version, stored_bands)) => {
                if version != SCHEMA_VERSION {
                    return Err(LshError::config(format!(
                        "index file {} has schema version {version}, expected {SCHEMA_VERSION}",
                        path.display()
                    )));
                }
                if num_bands > 0 && num_bands != stored_bands {
                    return Err(LshError::config(format!(
                        "index file {} contains {stored_bands} bands, {num_bands} were \
                         requested; pass -1 to adopt the stored value or delete the file",
                        path.display()
                    )));
                }
                if num_bands <= 0 && num_bands != -1 {
                    return Err(LshError::config(format!(
                        "num_bands must be positive or -1 (got {num_bands})"
                    )));
                }
                stored_bands
            }
            None => {
                if num_bands <= 0 {
                    return Err(LshError::config(format!(
                        "cannot adopt a band count from the new index file {} (got {num_bands})",
                        path.display()
                    )));
                }
                conn.execute(
                    "INSERT INTO meta (id, schema_version, num_bands) VALUES (0, ?1, ?2)",
                    params![SCHEMA_VERSION, num_bands],
                )
                .map_err(LshError::backend)?;
                num_bands
            }
        };

        tracing::debug!(path = %path.display(), num_bands = resolved, "opened index file");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
            num_bands: resolved as usize,
        })
    }

    /// The file this backend owns.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LshError> {
        self.conn
            .lock()
            .map_err(|_| LshError::backend("poisoned connection lock"))
    }
}

fn seeds_to_blob(seeds: &[u32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(seeds.len() * 4);
    for seed in seeds {
        blob.extend_from_slice(&seed.to_le_bytes());
    }
    blob
}

fn seeds_from_blob(blob: &[u8]) -> Result<Vec<u32>, LshError> {
    if blob.len() % 4 != 0 {
        return Err(LshError::backend(format!(
            "seed blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl LshBackend for SqliteBackend {
    fn num_bands(&self) -> usize {
        self.num_bands
    }

    fn is_empty(&self) -> Result<bool, LshError> {
        let conn = self.lock()?;
        let exists: i64 = conn
            .query_row("SELECT EXISTS(SELECT 1 FROM data)", [], |row| row.get(0))
            .map_err(LshError::backend)?;
        Ok(exists == 0)
    }

    fn add(
        &self,
        bucket_keys: &[(usize, u64)],
        signature: &Signature,
        doc_id: DocId,
    ) -> Result<bool, LshError> {
        let conn = self.lock()?;
        let exists: i64 = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM data WHERE doc_id = ?1)",
                params![doc_id],
                |row| row.get(0),
            )
            .map_err(LshError::backend)?;
        if exists != 0 {
            return Ok(false);
        }

        // The transaction rolls back on drop if anything below fails.
        let tx = conn.unchecked_transaction().map_err(LshError::backend)?;
        {
            let mut stmt = tx
                .prepare_cached("INSERT INTO data VALUES (?1, ?2, ?3, ?4, ?5)")
                .map_err(LshError::backend)?;
            for &(band, bucket) in bucket_keys {
                stmt.execute(params![
                    band as i64,
                    bucket as i64,
                    doc_id,
                    Option::<i64>::None,
                    Option::<i64>::None
                ])
                .map_err(LshError::backend)?;
            }
            for (position, &word) in signature.iter().enumerate() {
                stmt.execute(params![
                    Option::<i64>::None,
                    Option::<i64>::None,
                    doc_id,
                    i64::from(word),
                    position as i64
                ])
                .map_err(LshError::backend)?;
            }
        }
        tx.commit().map_err(LshError::backend)?;
        Ok(true)
    }

    fn get_fingerprint(&self, doc_id: DocId) -> Result<Signature, LshError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT sig_word FROM data
                 WHERE doc_id = ?1 AND sig_position IS NOT NULL
                 ORDER BY sig_position",
            )
            .map_err(LshError::backend)?;
        let words = stmt
            .query_map(params![doc_id], |row| row.get::<_, i64>(0))
            .map_err(LshError::backend)?
            .collect::<Result<Vec<i64>, _>>()
            .map_err(LshError::backend)?;
        if words.is_empty() {
            return Err(LshError::NotFound { doc_id });
        }
        Ok(words.into_iter().map(|w| w as u32).collect())
    }

    fn get_bucket(&self, band: usize, bucket: u64) -> Result<BTreeSet<DocId>, LshError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT doc_id FROM data WHERE band_id = ?1 AND bucket_id = ?2")
            .map_err(LshError::backend)?;
        let members = stmt
            .query_map(params![band as i64, bucket as i64], |row| row.get(0))
            .map_err(LshError::backend)?
            .collect::<Result<BTreeSet<DocId>, _>>()
            .map_err(LshError::backend)?;
        Ok(members)
    }

    fn scan_buckets(
        &self,
        visitor: &mut dyn FnMut(&BTreeSet<DocId>) -> Result<(), LshError>,
    ) -> Result<(), LshError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT band_id, bucket_id, doc_id FROM data
                 WHERE band_id IS NOT NULL
                 ORDER BY band_id, bucket_id",
            )
            .map_err(LshError::backend)?;
        let mut rows = stmt.query([]).map_err(LshError::backend)?;

        // Rows arrive grouped by (band, bucket); flush each group as one set.
        let mut current: Option<(i64, i64)> = None;
        let mut members: BTreeSet<DocId> = BTreeSet::new();
        while let Some(row) = rows.next().map_err(LshError::backend)? {
            let band: i64 = row.get(0).map_err(LshError::backend)?;
            let bucket: i64 = row.get(1).map_err(LshError::backend)?;
            let doc_id: DocId = row.get(2).map_err(LshError::backend)?;
            if current != Some((band, bucket)) {
                if !members.is_empty() {
                    visitor(&members)?;
                    members.clear();
                }
                current = Some((band, bucket));
            }
            members.insert(doc_id);
        }
        if !members.is_empty() {
            visitor(&members)?;
        }
        Ok(())
    }

    fn buckets(&self) -> Result<Vec<BTreeMap<u64, BTreeSet<DocId>>>, LshError> {
        let conn = self.lock()?;
        let mut tables: Vec<BTreeMap<u64, BTreeSet<DocId>>> =
            (0..self.num_bands).map(|_| BTreeMap::new()).collect();
        let mut stmt = conn
            .prepare_cached(
                "SELECT band_id, bucket_id, doc_id FROM data WHERE band_id IS NOT NULL",
            )
            .map_err(LshError::backend)?;
        let mut rows = stmt.query([]).map_err(LshError::backend)?;
        while let Some(row) = rows.next().map_err(LshError::backend)? {
            let band: i64 = row.get(0).map_err(LshError::backend)?;
            let bucket: i64 = row.get(1).map_err(LshError::backend)?;
            let doc_id: DocId = row.get(2).map_err(LshError::backend)?;
            let Some(table) = tables.get_mut(band as usize) else {
                return Err(LshError::backend(format!(
                    "band index {band} out of range for {} bands",
                    self.num_bands
                )));
            };
            table.entry(bucket as u64).or_default().insert(doc_id);
        }
        Ok(tables)
    }

    fn fingerprints(&self) -> Result<BTreeMap<DocId, Signature>, LshError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT doc_id, sig_word FROM data
                 WHERE sig_position IS NOT NULL
                 ORDER BY doc_id, sig_position",
            )
            .map_err(LshError::backend)?;
        let mut rows = stmt.query([]).map_err(LshError::backend)?;
        let mut out: BTreeMap<DocId, Signature> = BTreeMap::new();
        while let Some(row) = rows.next().map_err(LshError::backend)? {
            let doc_id: DocId = row.get(0).map_err(LshError::backend)?;
            let word: i64 = row.get(1).map_err(LshError::backend)?;
            out.entry(doc_id).or_default().push(word as u32);
        }
        Ok(out)
    }

    fn remove(&self, doc_id: DocId) -> Result<(), LshError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(LshError::backend)?;
        tx.execute("DELETE FROM data WHERE doc_id = ?1", params![doc_id])
            .map_err(LshError::backend)?;
        tx.execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])
            .map_err(LshError::backend)?;
        tx.commit().map_err(LshError::backend)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), LshError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(LshError::backend)?;
        tx.execute("DELETE FROM data", [])
            .map_err(LshError::backend)?;
        tx.execute("DELETE FROM documents", [])
            .map_err(LshError::backend)?;
        tx.commit().map_err(LshError::backend)?;
        Ok(())
    }

    fn doc_exists(&self, doc_id: DocId) -> Result<bool, LshError> {
        let conn = self.lock()?;
        let exists: i64 = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM data WHERE doc_id = ?1)",
                params![doc_id],
                |row| row.get(0),
            )
            .map_err(LshError::backend)?;
        Ok(exists != 0)
    }

    fn put_document(&self, doc_id: DocId, content: &[u8]) -> Result<(), LshError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (doc_id, content) VALUES (?1, ?2)",
            params![doc_id, content],
        )
        .map_err(LshError::backend)?;
        Ok(())
    }

    fn get_document(&self, doc_id: DocId) -> Result<Option<Vec<u8>>, LshError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT content FROM documents WHERE doc_id = ?1",
            params![doc_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(LshError::backend)
    }

    fn hasher_meta(&self) -> Result<Option<HasherMeta>, LshError> {
        let conn = self.lock()?;
        let row: Option<(Option<i64>, Option<i64>, Option<Vec<u8>>)> = conn
            .query_row(
                "SELECT num_seeds, ngram_width, seeds FROM meta WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(LshError::backend)?;
        match row {
            Some((Some(num_seeds), Some(ngram_width), Some(blob))) => Ok(Some(HasherMeta {
                num_seeds: num_seeds as usize,
                ngram_width: ngram_width as usize,
                seeds: seeds_from_blob(&blob)?,
            })),
            _ => Ok(None),
        }
    }

    fn put_hasher_meta(&self, meta: &HasherMeta) -> Result<(), LshError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE meta SET num_seeds = ?1, ngram_width = ?2, seeds = ?3 WHERE id = 0",
            params![
                meta.num_seeds as i64,
                meta.ngram_width as i64,
                seeds_to_blob(&meta.seeds)
            ],
        )
        .map_err(LshError::backend)?;
        Ok(())
    }
}
