//! Persistent embedding index with per-document write exclusion.
//!
//! Storage is SQLite with embeddings as little-endian f32 blobs.
//! Searches never touch SQLite: every document's entries live in an
//! immutable in-memory shard behind an `Arc`, and a search clones the
//! shard references under a brief read lock, then scores without holding
//! anything. Writers build a complete replacement shard, commit it to
//! SQLite in one transaction, and only then swap it into the map, so a
//! reader sees each document either entirely as it was or entirely as it
//! became. A per-document async mutex serializes writers for the same
//! document while leaving writers for other documents untouched.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quarry_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::types::{CatalogEntry, DocumentRecord, IndexEntry, IndexStats, SearchHit};

const META_DIMENSIONS_KEY: &str = "dimensions";

/// One document's complete set of indexed entries. Immutable once
/// published; updates replace the whole shard.
#[derive(Debug)]
struct DocumentShard {
    record: DocumentRecord,
    /// Sorted by `seq`.
    entries: Vec<IndexEntry>,
}

/// The embedding index.
pub struct EmbeddingIndex {
    path: PathBuf,
    dimensions: usize,
    conn: Mutex<Connection>,
    shards: RwLock<HashMap<String, Arc<DocumentShard>>>,
    doc_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EmbeddingIndex {
    /// Opens the index at `path`, creating it if absent.
    ///
    /// The dimension is pinned on first creation; reopening with a
    /// different one fails with [`AppError::DimensionMismatch`] rather
    /// than silently mixing incompatible vectors.
    pub fn open(path: &Path, dimensions: usize) -> AppResult<Self> {
        if dimensions == 0 {
            return Err(AppError::InvalidConfiguration(
                "Embedding dimensions must be positive".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Index(format!("Failed to open index database: {}", e)))?;
        init_schema(&conn)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_DIMENSIONS_KEY],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(AppError::Index(format!(
                    "Failed to read index metadata: {}",
                    other
                ))),
            })?;

        match stored {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                    params![META_DIMENSIONS_KEY, dimensions.to_string()],
                )
                .map_err(|e| AppError::Index(format!("Failed to pin dimensions: {}", e)))?;
            }
            Some(value) => {
                let pinned: usize = value.parse().map_err(|_| {
                    AppError::Index(format!("Corrupt dimension metadata: {:?}", value))
                })?;
                if pinned != dimensions {
                    return Err(AppError::DimensionMismatch {
                        expected: pinned,
                        actual: dimensions,
                    });
                }
            }
        }

        let shards = load_shards(&conn)?;
        info!(
            path = %path.display(),
            documents = shards.len(),
            dimensions,
            "Opened embedding index"
        );

        Ok(Self {
            path: path.to_path_buf(),
            dimensions,
            conn: Mutex::new(conn),
            shards: RwLock::new(shards),
            doc_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_dimension(&self, actual: usize) -> AppResult<()> {
        if actual != self.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }

    /// The write lock for one document, created on first use.
    async fn document_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.doc_locks.lock().await;
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Inserts or replaces a single entry, keyed by document and seq.
    ///
    /// A document row is created on demand so entries can be written
    /// without going through document ingestion.
    pub async fn upsert(&self, entry: IndexEntry) -> AppResult<()> {
        self.check_dimension(entry.embedding.len())?;
        let document_id = entry.document_id.clone();
        let lock = self.document_lock(&document_id).await;
        let _guard = lock.lock().await;

        let current = {
            let shards = self.shards.read().await;
            shards.get(&document_id).cloned()
        };
        let mut entries: Vec<IndexEntry> = current
            .as_ref()
            .map(|shard| shard.entries.clone())
            .unwrap_or_default();
        entries.retain(|e| e.seq != entry.seq);
        entries.push(entry.clone());
        entries.sort_by_key(|e| e.seq);

        let mut record = match current {
            Some(shard) => shard.record.clone(),
            None => DocumentRecord {
                id: document_id.clone(),
                source_path: None,
                format: "text".to_string(),
                title: None,
                content_hash: String::new(),
                ingested_at: Utc::now(),
                chunk_count: 0,
                byte_count: 0,
            },
        };
        record.chunk_count = entries.len() as u32;

        {
            let mut conn = self.conn.lock().await;
            let tx = conn
                .transaction()
                .map_err(|e| AppError::Index(format!("Failed to start transaction: {}", e)))?;
            tx.execute(
                "DELETE FROM entries WHERE document_id = ?1 AND seq = ?2",
                params![document_id, entry.seq],
            )
            .map_err(|e| AppError::Index(format!("Failed to clear entry: {}", e)))?;
            insert_entry(&tx, &entry)?;
            insert_document(&tx, &record)?;
            tx.commit()
                .map_err(|e| AppError::Index(format!("Failed to commit upsert: {}", e)))?;
        }

        let shard = Arc::new(DocumentShard { record, entries });
        self.shards.write().await.insert(document_id, shard);
        Ok(())
    }

    /// Atomically replaces everything indexed for a document.
    ///
    /// Readers see the old entries until the swap, then all of the new
    /// ones; there is no intermediate state.
    pub async fn replace_document(
        &self,
        record: DocumentRecord,
        entries: Vec<IndexEntry>,
    ) -> AppResult<()> {
        for entry in &entries {
            self.check_dimension(entry.embedding.len())?;
            if entry.document_id != record.id {
                return Err(AppError::Index(format!(
                    "Entry {} belongs to document {:?}, not {:?}",
                    entry.chunk_id, entry.document_id, record.id
                )));
            }
        }
        let mut entries = entries;
        entries.sort_by_key(|e| e.seq);
        let mut record = record;
        record.chunk_count = entries.len() as u32;

        let lock = self.document_lock(&record.id).await;
        let _guard = lock.lock().await;

        {
            let mut conn = self.conn.lock().await;
            let tx = conn
                .transaction()
                .map_err(|e| AppError::Index(format!("Failed to start transaction: {}", e)))?;
            tx.execute(
                "DELETE FROM entries WHERE document_id = ?1",
                params![record.id],
            )
            .map_err(|e| AppError::Index(format!("Failed to clear document entries: {}", e)))?;
            insert_document(&tx, &record)?;
            for entry in &entries {
                insert_entry(&tx, entry)?;
            }
            tx.commit()
                .map_err(|e| AppError::Index(format!("Failed to commit document: {}", e)))?;
        }

        debug!(
            document_id = %record.id,
            chunks = entries.len(),
            "Replaced document in index"
        );
        let document_id = record.id.clone();
        let shard = Arc::new(DocumentShard { record, entries });
        self.shards.write().await.insert(document_id, shard);
        Ok(())
    }

    /// Removes a document and its entries. Unknown ids are a no-op;
    /// returns how many entries were removed.
    pub async fn delete(&self, document_id: &str) -> AppResult<u32> {
        let lock = self.document_lock(document_id).await;
        let _guard = lock.lock().await;

        let removed = {
            let mut conn = self.conn.lock().await;
            let tx = conn
                .transaction()
                .map_err(|e| AppError::Index(format!("Failed to start transaction: {}", e)))?;
            let removed = tx
                .execute(
                    "DELETE FROM entries WHERE document_id = ?1",
                    params![document_id],
                )
                .map_err(|e| AppError::Index(format!("Failed to delete entries: {}", e)))?;
            tx.execute(
                "DELETE FROM documents WHERE id = ?1",
                params![document_id],
            )
            .map_err(|e| AppError::Index(format!("Failed to delete document: {}", e)))?;
            tx.commit()
                .map_err(|e| AppError::Index(format!("Failed to commit delete: {}", e)))?;
            removed as u32
        };

        self.shards.write().await.remove(document_id);
        if removed > 0 {
            debug!(document_id, removed, "Deleted document from index");
        }
        Ok(removed)
    }

    /// Brute-force cosine search over the in-memory shards.
    ///
    /// Results are ranked by score descending; ties break toward the
    /// lower seq, then the lexicographically smaller document id, so
    /// equal-score orderings are stable across runs. `scope` narrows the
    /// scan to documents whose id or title contains the hint,
    /// case-insensitively; a hint matching nothing yields no results.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        scope: Option<&str>,
    ) -> AppResult<Vec<SearchHit>> {
        self.check_dimension(query_embedding.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let snapshot: Vec<Arc<DocumentShard>> = {
            let shards = self.shards.read().await;
            match scope {
                Some(hint) => shards
                    .values()
                    .filter(|shard| scope_matches(&shard.record, hint))
                    .cloned()
                    .collect(),
                None => shards.values().cloned().collect(),
            }
        };

        let mut scored: Vec<(f32, &IndexEntry)> = snapshot
            .iter()
            .flat_map(|shard| shard.entries.iter())
            .map(|entry| (cosine_similarity(query_embedding, &entry.embedding), entry))
            .collect();

        scored.sort_by(|a, b| {
            b.0
                .partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.seq.cmp(&b.1.seq))
                .then_with(|| a.1.document_id.cmp(&b.1.document_id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchHit {
                chunk_id: entry.chunk_id.clone(),
                document_id: entry.document_id.clone(),
                seq: entry.seq,
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    /// The stored content hash for a document, if it is indexed.
    pub async fn document_hash(&self, document_id: &str) -> Option<String> {
        let shards = self.shards.read().await;
        shards
            .get(document_id)
            .map(|shard| shard.record.content_hash.clone())
    }

    /// All indexed documents, sorted by id.
    pub async fn catalog(&self) -> Vec<CatalogEntry> {
        let shards = self.shards.read().await;
        let mut entries: Vec<CatalogEntry> = shards
            .values()
            .map(|shard| CatalogEntry {
                document_id: shard.record.id.clone(),
                title: shard.record.title.clone(),
                chunk_count: shard.record.chunk_count,
            })
            .collect();
        entries.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        entries
    }

    pub async fn stats(&self) -> IndexStats {
        let shards = self.shards.read().await;
        IndexStats {
            documents: shards.len() as u32,
            chunks: shards
                .values()
                .map(|shard| shard.entries.len() as u32)
                .sum(),
            dimensions: self.dimensions,
            db_size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Case-insensitive substring match against the document id or title.
fn scope_matches(record: &DocumentRecord, hint: &str) -> bool {
    let hint = hint.trim().to_lowercase();
    if hint.is_empty() {
        return false;
    }
    if record.id.to_lowercase().contains(&hint) {
        return true;
    }
    record
        .title
        .as_ref()
        .map(|title| title.to_lowercase().contains(&hint))
        .unwrap_or(false)
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_path TEXT,
            format TEXT NOT NULL,
            title TEXT,
            content_hash TEXT NOT NULL,
            ingested_at TEXT NOT NULL,
            chunk_count INTEGER NOT NULL,
            byte_count INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS entries (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            overlap INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_entries_document ON entries(document_id);",
    )
    .map_err(|e| AppError::Index(format!("Failed to initialize schema: {}", e)))
}

fn insert_document(conn: &Connection, record: &DocumentRecord) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO documents
         (id, source_path, format, title, content_hash, ingested_at, chunk_count, byte_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.source_path,
            record.format,
            record.title,
            record.content_hash,
            record.ingested_at.to_rfc3339(),
            record.chunk_count,
            record.byte_count,
        ],
    )
    .map_err(|e| AppError::Index(format!("Failed to write document record: {}", e)))?;
    Ok(())
}

fn insert_entry(conn: &Connection, entry: &IndexEntry) -> AppResult<()> {
    let metadata = serde_json::to_string(&entry.metadata)?;
    conn.execute(
        "INSERT OR REPLACE INTO entries
         (chunk_id, document_id, seq, start_offset, end_offset, overlap, text, embedding, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.chunk_id,
            entry.document_id,
            entry.seq,
            entry.start as i64,
            entry.end as i64,
            entry.overlap as i64,
            entry.text,
            embedding_to_bytes(&entry.embedding),
            metadata,
        ],
    )
    .map_err(|e| AppError::Index(format!("Failed to write index entry: {}", e)))?;
    Ok(())
}

fn load_shards(conn: &Connection) -> AppResult<HashMap<String, Arc<DocumentShard>>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_path, format, title, content_hash, ingested_at, chunk_count, byte_count
             FROM documents",
        )
        .map_err(|e| AppError::Index(format!("Failed to prepare document query: {}", e)))?;
    let records = stmt
        .query_map([], |row| {
            let ingested_raw: String = row.get(5)?;
            let ingested_at = DateTime::parse_from_rfc3339(&ingested_raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(DocumentRecord {
                id: row.get(0)?,
                source_path: row.get(1)?,
                format: row.get(2)?,
                title: row.get(3)?,
                content_hash: row.get(4)?,
                ingested_at,
                chunk_count: row.get(6)?,
                byte_count: row.get(7)?,
            })
        })
        .map_err(|e| AppError::Index(format!("Failed to query documents: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Index(format!("Failed to read document row: {}", e)))?;

    let mut stmt = conn
        .prepare(
            "SELECT chunk_id, document_id, seq, start_offset, end_offset, overlap, text, embedding, metadata
             FROM entries ORDER BY document_id, seq",
        )
        .map_err(|e| AppError::Index(format!("Failed to prepare entry query: {}", e)))?;
    let entries = stmt
        .query_map([], |row| {
            let metadata_raw: String = row.get(8)?;
            let metadata = serde_json::from_str(&metadata_raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(IndexEntry {
                chunk_id: row.get(0)?,
                document_id: row.get(1)?,
                seq: row.get(2)?,
                start: row.get::<_, i64>(3)? as usize,
                end: row.get::<_, i64>(4)? as usize,
                overlap: row.get::<_, i64>(5)? as usize,
                text: row.get(6)?,
                embedding: bytes_to_embedding(&row.get::<_, Vec<u8>>(7)?),
                metadata,
            })
        })
        .map_err(|e| AppError::Index(format!("Failed to query entries: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Index(format!("Failed to read entry row: {}", e)))?;

    let mut by_document: HashMap<String, Vec<IndexEntry>> = HashMap::new();
    for entry in entries {
        by_document
            .entry(entry.document_id.clone())
            .or_default()
            .push(entry);
    }

    let mut shards = HashMap::new();
    for record in records {
        let entries = by_document.remove(&record.id).unwrap_or_default();
        shards.insert(
            record.id.clone(),
            Arc::new(DocumentShard { record, entries }),
        );
    }
    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;
    use tempfile::TempDir;

    fn entry(document_id: &str, seq: u32, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: format!("{}#{}", document_id, seq),
            document_id: document_id.to_string(),
            seq,
            start: (seq as usize) * 100,
            end: (seq as usize + 1) * 100,
            overlap: 0,
            text: format!("chunk {} of {}", seq, document_id),
            embedding,
            metadata: ChunkMetadata::default(),
        }
    }

    fn unit(direction: usize, dimensions: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimensions];
        v[direction % dimensions] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_upsert_and_self_search() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        let embedding = vec![0.1, 0.7, 0.2, 0.0];
        index.upsert(entry("doc.md", 0, embedding.clone())).await.unwrap();

        let hits = index.search(&embedding, 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "doc.md");
        assert_eq!(hits[0].seq, 0);
        assert!(hits[0].score > 0.999);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimensions() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        let result = index.upsert(entry("doc.md", 0, vec![1.0, 0.0])).await;
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_query_dimensions() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();
        let result = index.search(&[1.0, 0.0], 5, None).await;
        assert!(matches!(result, Err(AppError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_position() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        index.upsert(entry("doc.md", 0, unit(0, 4))).await.unwrap();
        let mut updated = entry("doc.md", 0, unit(1, 4));
        updated.text = "updated text".to_string();
        index.upsert(updated).await.unwrap();

        let hits = index.search(&unit(1, 4), 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "updated text");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        index.upsert(entry("doc.md", 0, unit(0, 4))).await.unwrap();
        index.upsert(entry("doc.md", 1, unit(1, 4))).await.unwrap();

        assert_eq!(index.delete("doc.md").await.unwrap(), 2);
        assert!(index.search(&unit(0, 4), 10, None).await.unwrap().is_empty());
        assert_eq!(index.delete("doc.md").await.unwrap(), 0);
        assert_eq!(index.delete("never-existed.md").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ties_break_by_seq_then_document_id() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        // Identical embeddings make every score equal.
        let shared = unit(2, 4);
        index.upsert(entry("beta.md", 0, shared.clone())).await.unwrap();
        index.upsert(entry("alpha.md", 1, shared.clone())).await.unwrap();
        index.upsert(entry("alpha.md", 0, shared.clone())).await.unwrap();

        let hits = index.search(&shared, 10, None).await.unwrap();
        let order: Vec<(String, u32)> = hits
            .iter()
            .map(|h| (h.document_id.clone(), h.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alpha.md".to_string(), 0),
                ("beta.md".to_string(), 0),
                ("alpha.md".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_truncates_to_k() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        for seq in 0..5 {
            index
                .upsert(entry("doc.md", seq, unit(seq as usize, 4)))
                .await
                .unwrap();
        }

        assert_eq!(index.search(&unit(0, 4), 3, None).await.unwrap().len(), 3);
        assert!(index.search(&unit(0, 4), 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scope_narrows_by_id_and_title() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        let shared = unit(0, 4);
        let delta = DocumentRecord {
            id: "policies/delta.md".to_string(),
            source_path: None,
            format: "markdown".to_string(),
            title: Some("Delta Pet Policy".to_string()),
            content_hash: "h1".to_string(),
            ingested_at: Utc::now(),
            chunk_count: 0,
            byte_count: 0,
        };
        let united = DocumentRecord {
            id: "policies/united.md".to_string(),
            source_path: None,
            format: "markdown".to_string(),
            title: Some("United Pet Policy".to_string()),
            content_hash: "h2".to_string(),
            ingested_at: Utc::now(),
            chunk_count: 0,
            byte_count: 0,
        };
        index
            .replace_document(delta, vec![entry("policies/delta.md", 0, shared.clone())])
            .await
            .unwrap();
        index
            .replace_document(united, vec![entry("policies/united.md", 0, shared.clone())])
            .await
            .unwrap();

        let hits = index.search(&shared, 10, Some("DELTA")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "policies/delta.md");

        // Title matches count too.
        let hits = index.search(&shared, 10, Some("united pet")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "policies/united.md");

        // A hint matching nothing yields nothing.
        assert!(index
            .search(&shared, 10, Some("alaska"))
            .await
            .unwrap()
            .is_empty());
        assert!(index.search(&shared, 10, Some("  ")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_document_removes_stale_entries() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        for seq in 0..4 {
            index
                .upsert(entry("doc.md", seq, unit(seq as usize, 4)))
                .await
                .unwrap();
        }

        let record = DocumentRecord {
            id: "doc.md".to_string(),
            source_path: None,
            format: "text".to_string(),
            title: None,
            content_hash: "new-hash".to_string(),
            ingested_at: Utc::now(),
            chunk_count: 0,
            byte_count: 10,
        };
        index
            .replace_document(record, vec![entry("doc.md", 0, unit(0, 4))])
            .await
            .unwrap();

        let hits = index.search(&unit(0, 4), 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.document_hash("doc.md").await.as_deref(), Some("new-hash"));

        let catalog = index.catalog().await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].chunk_count, 1);
    }

    #[tokio::test]
    async fn test_replace_document_rejects_foreign_entries() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();

        let record = DocumentRecord {
            id: "a.md".to_string(),
            source_path: None,
            format: "text".to_string(),
            title: None,
            content_hash: String::new(),
            ingested_at: Utc::now(),
            chunk_count: 0,
            byte_count: 0,
        };
        let result = index
            .replace_document(record, vec![entry("b.md", 0, unit(0, 4))])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.sqlite3");

        {
            let index = EmbeddingIndex::open(&path, 4).unwrap();
            index.upsert(entry("doc.md", 0, unit(0, 4))).await.unwrap();
            index.upsert(entry("doc.md", 1, unit(1, 4))).await.unwrap();
        }

        let reopened = EmbeddingIndex::open(&path, 4).unwrap();
        let hits = reopened.search(&unit(1, 4), 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].seq, 1);

        let stats = reopened.stats().await;
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.dimensions, 4);
        assert!(stats.db_size_bytes > 0);
    }

    #[tokio::test]
    async fn test_reopen_with_different_dimensions_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.sqlite3");
        drop(EmbeddingIndex::open(&path, 4).unwrap());

        let result = EmbeddingIndex::open(&path, 8);
        assert!(matches!(
            result,
            Err(AppError::DimensionMismatch {
                expected: 4,
                actual: 8
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_index_searches_empty() {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("index.sqlite3"), 4).unwrap();
        assert!(index.search(&unit(0, 4), 10, None).await.unwrap().is_empty());
        assert!(index.catalog().await.is_empty());
        assert_eq!(index.stats().await.documents, 0);
    }

    #[test]
    fn test_embedding_byte_round_trip() {
        let embedding = vec![0.0, -1.5, 3.25, f32::MIN_POSITIVE];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&embedding)), embedding);
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
