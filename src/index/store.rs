use super::{vector, IndexError};
use crate::chunking::{Chunk, ChunkKind, DocumentMetadata};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type DbPool = Pool<SqliteConnectionManager>;

const DEFAULT_BATCH_SIZE: usize = 1000;

/// A chunk ready to be written with its vector
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub content_hash: String,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        let content_hash = super::content_hash(&chunk.text);
        Self {
            chunk,
            vector,
            content_hash,
        }
    }
}

/// An entry as persisted, including its insertion order
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub seq: i64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub content_hash: String,
}

/// A query hit
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub chunk: Chunk,
    /// `1 - cosine similarity`; lower is closer
    pub distance: f32,
    pub seq: i64,
}

/// SQLite-backed vector index for one collection
pub struct EmbeddingIndex {
    pool: DbPool,
    path: PathBuf,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingIndex {
    /// Create or open the collection file at `path`
    ///
    /// The first open records the embedding model and dimension. Later opens with a
    /// different model or dimension fail with [`IndexError::ModelMismatch`].
    pub fn open(path: &Path, model: &str, dimension: usize) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::Io {
                source: e,
                context: format!("Failed to create index directory: {:?}", parent),
            })?;
        }

        // synchronous is per connection, so every pooled connection gets it
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "FULL")?;
            conn.busy_timeout(std::time::Duration::from_millis(5000))
        });

        let pool = Pool::builder().max_size(4).build(manager)?;

        let index = Self {
            pool,
            path: path.to_path_buf(),
            model: model.to_string(),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        };

        index.migrate()?;
        index.check_model()?;

        tracing::debug!(
            "Opened index {:?} ({}, {}D)",
            index.path,
            index.model,
            index.dimension
        );

        Ok(index)
    }

    /// Maximum entries written per transaction
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, IndexError> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<(), IndexError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i64 + 1;

            if version > current_version {
                tracing::info!("Applying index migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    fn check_model(&self) -> Result<(), IndexError> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let stored_model: Option<String> = tx
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'model'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let stored_dimension: Option<String> = tx
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match (stored_model, stored_dimension) {
            (Some(stored_model), Some(stored_dimension)) => {
                let stored_dimension: usize =
                    stored_dimension.parse().map_err(|_| IndexError::Corrupt {
                        id: "index_meta.dimension".to_string(),
                        reason: format!("not a number: {}", stored_dimension),
                    })?;

                if stored_model != self.model || stored_dimension != self.dimension {
                    return Err(IndexError::ModelMismatch {
                        stored_model,
                        stored_dimension,
                        model: self.model.clone(),
                        dimension: self.dimension,
                    });
                }
            }
            _ => {
                tx.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('model', ?1)",
                    params![self.model],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![self.dimension.to_string()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Insert or replace entries by chunk id
    ///
    /// An existing id keeps its insertion order. All vectors are checked before
    /// anything is written; every batch is committed before returning.
    pub fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        for entry in entries {
            if entry.vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    id: entry.chunk.id.clone(),
                    expected: self.dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        let mut conn = self.get_conn()?;
        let indexed_at = chrono::Utc::now().to_rfc3339();
        let mut written = 0;

        for batch in entries.chunks(self.batch_size) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO entries
                        (id, path, start_line, end_line, name, kind, text, content_hash, metadata, vector, indexed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(id) DO UPDATE SET
                        path = excluded.path,
                        start_line = excluded.start_line,
                        end_line = excluded.end_line,
                        name = excluded.name,
                        kind = excluded.kind,
                        text = excluded.text,
                        content_hash = excluded.content_hash,
                        metadata = excluded.metadata,
                        vector = excluded.vector,
                        indexed_at = excluded.indexed_at",
                )?;

                for entry in batch {
                    let chunk = &entry.chunk;
                    let metadata = serde_json::to_string(&chunk.metadata)?;
                    stmt.execute(params![
                        chunk.id,
                        chunk.path,
                        chunk.start_line as i64,
                        chunk.end_line as i64,
                        chunk.name,
                        chunk.kind.as_str(),
                        chunk.text,
                        entry.content_hash,
                        metadata,
                        vector::encode(&entry.vector),
                        indexed_at,
                    ])?;
                }
            }
            tx.commit()?;
            written += batch.len();
            tracing::debug!("Committed {} entries to {:?}", batch.len(), self.path);
        }

        Ok(written)
    }

    /// Exact k nearest neighbours by cosine distance, ties broken by insertion order
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut scored: Vec<(f32, i64)> = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT seq, id, vector FROM entries")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let seq: i64 = row.get(0)?;
                let id: String = row.get(1)?;
                let bytes: Vec<u8> = row.get(2)?;
                let stored = decode_vector(&id, &bytes)?;
                scored.push((vector::cosine_distance(query, &stored), seq));
            }
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        let mut neighbors = Vec::with_capacity(scored.len());
        for (distance, seq) in scored {
            let entry = conn.query_row(
                &format!("SELECT {} FROM entries WHERE seq = ?1", ENTRY_COLUMNS),
                params![seq],
                RawEntry::from_row,
            )?;
            let stored = entry.into_stored()?;
            neighbors.push(Neighbor {
                chunk: stored.chunk,
                distance,
                seq,
            });
        }

        Ok(neighbors)
    }

    /// Total number of entries; zero means the collection was never indexed
    pub fn count(&self) -> Result<usize, IndexError> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Stored content hashes for the ids that exist
    pub fn content_hashes(&self, ids: &[String]) -> Result<HashMap<String, String>, IndexError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare_cached("SELECT content_hash FROM entries WHERE id = ?1")?;
        let mut hashes = HashMap::new();

        for id in ids {
            let hash: Option<String> = stmt
                .query_row(params![id], |row| row.get(0))
                .optional()?;
            if let Some(hash) = hash {
                hashes.insert(id.clone(), hash);
            }
        }

        Ok(hashes)
    }

    /// Fetch one entry by chunk id
    pub fn get(&self, id: &str) -> Result<Option<StoredEntry>, IndexError> {
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                RawEntry::from_row,
            )
            .optional()?;

        entry.map(RawEntry::into_stored).transpose()
    }
}

const ENTRY_COLUMNS: &str =
    "seq, id, path, start_line, end_line, name, kind, text, content_hash, metadata, vector";

/// Row as read from SQLite, before validation
struct RawEntry {
    seq: i64,
    id: String,
    path: String,
    start_line: i64,
    end_line: i64,
    name: Option<String>,
    kind: String,
    text: String,
    content_hash: String,
    metadata: String,
    vector: Vec<u8>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            path: row.get(2)?,
            start_line: row.get(3)?,
            end_line: row.get(4)?,
            name: row.get(5)?,
            kind: row.get(6)?,
            text: row.get(7)?,
            content_hash: row.get(8)?,
            metadata: row.get(9)?,
            vector: row.get(10)?,
        })
    }

    fn into_stored(self) -> Result<StoredEntry, IndexError> {
        let kind = ChunkKind::parse(&self.kind).ok_or_else(|| IndexError::Corrupt {
            id: self.id.clone(),
            reason: format!("unknown chunk kind '{}'", self.kind),
        })?;
        let metadata: DocumentMetadata = serde_json::from_str(&self.metadata)?;
        let vector = decode_vector(&self.id, &self.vector)?;

        Ok(StoredEntry {
            seq: self.seq,
            chunk: Chunk {
                id: self.id,
                text: self.text,
                path: self.path,
                start_line: self.start_line as usize,
                end_line: self.end_line as usize,
                name: self.name,
                kind,
                metadata,
            },
            vector,
            content_hash: self.content_hash,
        })
    }
}

fn decode_vector(id: &str, bytes: &[u8]) -> Result<Vec<f32>, IndexError> {
    vector::decode(bytes).ok_or_else(|| IndexError::Corrupt {
        id: id.to_string(),
        reason: format!("vector blob of {} bytes", bytes.len()),
    })
}

/// Index migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE index_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE entries (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        name TEXT,
        kind TEXT NOT NULL,
        text TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        metadata TEXT NOT NULL,
        vector BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX idx_entries_path ON entries(path);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            path: "src/lib.rs".to_string(),
            start_line: 1,
            end_line: 3,
            name: Some("run".to_string()),
            kind: ChunkKind::Method,
            metadata: DocumentMetadata::default(),
        }
    }

    fn open(temp: &TempDir) -> EmbeddingIndex {
        EmbeddingIndex::open(&temp.path().join("vectors/code.sqlite"), "test-model", 3).unwrap()
    }

    #[test]
    fn test_upsert_and_count() {
        let temp = TempDir::new().unwrap();
        let index = open(&temp);
        assert_eq!(index.count().unwrap(), 0);

        let entries = vec![
            IndexEntry::new(chunk("a:1", "alpha"), vec![1.0, 0.0, 0.0]),
            IndexEntry::new(chunk("b:1", "beta"), vec![0.0, 1.0, 0.0]),
        ];
        assert_eq!(index.upsert(&entries).unwrap(), 2);
        assert_eq!(index.count().unwrap(), 2);
    }

    #[test]
    fn test_upsert_replaces_and_keeps_order() {
        let temp = TempDir::new().unwrap();
        let index = open(&temp).with_batch_size(1);

        index
            .upsert(&[
                IndexEntry::new(chunk("a:1", "alpha"), vec![1.0, 0.0, 0.0]),
                IndexEntry::new(chunk("b:1", "beta"), vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();
        let before = index.get("a:1").unwrap().unwrap();

        index
            .upsert(&[IndexEntry::new(chunk("a:1", "alpha v2"), vec![1.0, 0.0, 0.0])])
            .unwrap();
        let after = index.get("a:1").unwrap().unwrap();

        assert_eq!(index.count().unwrap(), 2);
        assert_eq!(after.seq, before.seq);
        assert_eq!(after.chunk.text, "alpha v2");
        assert_eq!(after.content_hash, crate::index::content_hash("alpha v2"));

        // identical vectors: insertion order decides
        let ids: Vec<String> = index
            .query(&[1.0, 0.0, 0.0], 2)
            .unwrap()
            .into_iter()
            .map(|n| n.chunk.id)
            .collect();
        assert_eq!(ids, vec!["a:1", "b:1"]);
    }

    #[test]
    fn test_query_orders_by_distance() {
        let temp = TempDir::new().unwrap();
        let index = open(&temp);
        index
            .upsert(&[
                IndexEntry::new(chunk("far:1", "far"), vec![-1.0, 0.0, 0.0]),
                IndexEntry::new(chunk("near:1", "near"), vec![0.9, 0.1, 0.0]),
                IndexEntry::new(chunk("mid:1", "mid"), vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 2).unwrap();
        let ids: Vec<&str> = hits.iter().map(|n| n.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near:1", "mid:1"]);
        assert!(hits[0].distance < hits[1].distance);
        assert_eq!(hits[0].chunk.name.as_deref(), Some("run"));
    }

    #[test]
    fn test_reopen_with_other_model_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("code.sqlite");
        EmbeddingIndex::open(&path, "model-a", 3).unwrap();

        assert!(EmbeddingIndex::open(&path, "model-a", 3).is_ok());
        assert!(matches!(
            EmbeddingIndex::open(&path, "model-b", 3),
            Err(IndexError::ModelMismatch { .. })
        ));
        assert!(matches!(
            EmbeddingIndex::open(&path, "model-a", 4),
            Err(IndexError::ModelMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_dimension_rejected_before_write() {
        let temp = TempDir::new().unwrap();
        let index = open(&temp);

        let result = index.upsert(&[
            IndexEntry::new(chunk("ok:1", "ok"), vec![1.0, 0.0, 0.0]),
            IndexEntry::new(chunk("bad:1", "bad"), vec![1.0, 0.0]),
        ]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_content_hashes_only_for_known_ids() {
        let temp = TempDir::new().unwrap();
        let index = open(&temp);
        index
            .upsert(&[IndexEntry::new(chunk("a:1", "alpha"), vec![1.0, 0.0, 0.0])])
            .unwrap();

        let hashes = index
            .content_hashes(&["a:1".to_string(), "missing:1".to_string()])
            .unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes["a:1"], crate::index::content_hash("alpha"));
    }
}
