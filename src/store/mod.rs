//! Persistent vector store for extracted exam pages.
//!
//! One SQLite file (WAL journal) holds any number of named collections. Each
//! record row carries the page metadata, the raw extracted text and its
//! embedding as a little-endian `f32` BLOB; queries embed the query text and
//! rank rows by cosine similarity.
//!
//! ## Schema
//!
//! ```text
//! collections(name PK, model, dims, created_at)
//! records(collection, id, year, paper, page, topic, source, text, embedding,
//!         PK(collection, id))
//! ```
//!
//! The collection row pins the embedding model; opening it with a different
//! embedder is an error, since vectors from two models are not comparable.

pub mod embedder;

pub use embedder::{create_embedder, Embedder};

use crate::error::StudyBotError;
use crate::record::ExamPageRecord;
use embedder::{blob_to_vec, cosine_similarity, vec_to_blob};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// A record returned by [`ExamStore::query`] with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: ExamPageRecord,
    pub score: f32,
}

/// Handle to one collection of the store.
///
/// Cheap to share by reference across ingestion workers; the pool serialises
/// writes.
pub struct ExamStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    collection: String,
    path: PathBuf,
}

impl ExamStore {
    /// Open (creating if needed) the store at `path` and the named collection.
    pub async fn open(
        path: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StudyBotError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StudyBotError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let pool = connect(path, true).await?;
        migrate(&pool).await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO collections (name, model, dims, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(embedder.model_name())
        .bind(embedder.dims() as i64)
        .bind(now)
        .execute(&pool)
        .await?;

        let store = Self {
            pool,
            embedder,
            collection: collection.to_string(),
            path: path.to_path_buf(),
        };
        store.check_model().await?;
        info!(
            "Opened collection '{}' at {}",
            store.collection,
            store.path.display()
        );
        Ok(store)
    }

    /// Open a collection that must already exist.
    ///
    /// Used by search and inspection, which have nothing to do against an
    /// empty store.
    pub async fn open_existing(
        path: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StudyBotError> {
        let not_found = || StudyBotError::CollectionNotFound {
            collection: collection.to_string(),
            path: path.to_path_buf(),
        };
        if !path.is_file() {
            return Err(not_found());
        }

        let pool = connect(path, false).await?;
        let has_table: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'collections'",
        )
        .fetch_optional(&pool)
        .await?;
        if has_table.is_none() {
            return Err(not_found());
        }
        let known: Option<String> =
            sqlx::query_scalar("SELECT name FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&pool)
                .await?;
        if known.is_none() {
            return Err(not_found());
        }

        let store = Self {
            pool,
            embedder,
            collection: collection.to_string(),
            path: path.to_path_buf(),
        };
        store.check_model().await?;
        Ok(store)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn check_model(&self) -> Result<(), StudyBotError> {
        let row = sqlx::query("SELECT model, dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        let model: String = row.get("model");
        let dims: i64 = row.get("dims");
        if model != self.embedder.model_name() || dims as usize != self.embedder.dims() {
            return Err(StudyBotError::InvalidConfig(format!(
                "collection '{}' was built with embedding model '{}' ({} dims), \
                 but '{}' ({} dims) is configured",
                self.collection,
                model,
                dims,
                self.embedder.model_name(),
                self.embedder.dims()
            )));
        }
        Ok(())
    }

    /// Whether a record with this identifier is stored.
    pub async fn exists(&self, id: &str) -> Result<bool, StudyBotError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM records WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Embed the record text and insert or replace the record.
    pub async fn upsert(&self, record: &ExamPageRecord) -> Result<(), StudyBotError> {
        let vector = self
            .embedder
            .embed(std::slice::from_ref(&record.text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudyBotError::Embedding("embedder returned no vector".into()))?;

        sqlx::query(
            r#"
            INSERT INTO records (collection, id, year, paper, page, topic, source, text, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                year = excluded.year,
                paper = excluded.paper,
                page = excluded.page,
                topic = excluded.topic,
                source = excluded.source,
                text = excluded.text,
                embedding = excluded.embedding
            "#,
        )
        .bind(&self.collection)
        .bind(&record.id)
        .bind(record.year as i64)
        .bind(record.paper as i64)
        .bind(record.page as i64)
        .bind(&record.topic)
        .bind(&record.source)
        .bind(&record.text)
        .bind(vec_to_blob(&vector))
        .execute(&self.pool)
        .await?;

        debug!("Upserted {} ({})", record.id, record.topic);
        Ok(())
    }

    /// Fetch one record by identifier.
    pub async fn get(&self, id: &str) -> Result<Option<ExamPageRecord>, StudyBotError> {
        let row = sqlx::query(
            "SELECT id, year, paper, page, topic, source, text FROM records \
             WHERE collection = ? AND id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_record))
    }

    /// Number of records in the collection.
    pub async fn count(&self) -> Result<u64, StudyBotError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    /// Record counts per exam year, ascending by year.
    pub async fn count_by_year(&self) -> Result<Vec<(u16, u64)>, StudyBotError> {
        let rows = sqlx::query(
            "SELECT year, COUNT(*) AS n FROM records WHERE collection = ? \
             GROUP BY year ORDER BY year",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("year") as u16, r.get::<i64, _>("n") as u64))
            .collect())
    }

    /// Nearest records to `text`, best first.
    ///
    /// `topic` restricts the candidates to records whose topic label matches
    /// case-insensitively.
    pub async fn query(
        &self,
        text: &str,
        limit: usize,
        topic: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, StudyBotError> {
        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StudyBotError::Embedding("embedder returned no vector".into()))?;

        let rows = match topic {
            Some(topic) => {
                sqlx::query(
                    "SELECT id, year, paper, page, topic, source, text, embedding FROM records \
                     WHERE collection = ? AND topic = ? COLLATE NOCASE",
                )
                .bind(&self.collection)
                .bind(topic)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, year, paper, page, topic, source, text, embedding FROM records \
                     WHERE collection = ?",
                )
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut scored: Vec<ScoredRecord> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredRecord {
                    record: row_to_record(row),
                    score: cosine_similarity(&query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        debug!(
            "Query matched {} records (topic filter: {:?})",
            scored.len(),
            topic
        );
        Ok(scored)
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool, StudyBotError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    Ok(SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?)
}

async fn migrate(pool: &SqlitePool) -> Result<(), StudyBotError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            year INTEGER NOT NULL,
            paper INTEGER NOT NULL,
            page INTEGER NOT NULL,
            topic TEXT NOT NULL,
            source TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_topic ON records(collection, topic)")
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ExamPageRecord {
    ExamPageRecord {
        id: row.get("id"),
        year: row.get::<i64, _>("year") as u16,
        paper: row.get::<i64, _>("paper") as u8,
        page: row.get::<i64, _>("page") as usize,
        topic: row.get("topic"),
        source: row.get("source"),
        text: row.get("text"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Bag-of-words hashing embedder: shared words mean nearby vectors.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash-16"
        }

        fn dims(&self) -> usize {
            16
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StudyBotError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 16];
                    for word in t.to_lowercase().split_whitespace() {
                        let h = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
                        v[h % 16] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn record(year: u16, paper: u8, page: usize, topic: &str, text: &str) -> ExamPageRecord {
        ExamPageRecord {
            id: crate::record::record_id(year, paper, page),
            year,
            paper,
            page,
            text: text.into(),
            topic: topic.into(),
            source: crate::pipeline::input::paper_filename(year, paper),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExamStore::open(&dir.path().join("db/store.sqlite"), "t", Arc::new(HashEmbedder))
            .await
            .unwrap();

        let r = record(2023, 1, 2, "Algorithms", "dijkstra shortest path");
        assert!(!store.exists(&r.id).await.unwrap());
        store.upsert(&r).await.unwrap();
        assert!(store.exists(&r.id).await.unwrap());
        assert_eq!(store.get(&r.id).await.unwrap(), Some(r.clone()));

        // second upsert replaces, never duplicates
        store.upsert(&r).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_ranks_and_filters_by_topic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExamStore::open(&dir.path().join("s.sqlite"), "t", Arc::new(HashEmbedder))
            .await
            .unwrap();
        store
            .upsert(&record(2020, 1, 2, "Algorithms", "dijkstra shortest path graph"))
            .await
            .unwrap();
        store
            .upsert(&record(2021, 2, 3, "Digital Electronics", "karnaugh map minimisation"))
            .await
            .unwrap();

        let hits = store.query("karnaugh map", 5, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, "2021_2_3");

        let hits = store
            .query("karnaugh map", 5, Some("algorithms"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.topic, "Algorithms");

        let hits = store.query("anything", 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn open_existing_requires_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.sqlite");

        let err = ExamStore::open_existing(&path, "t", Arc::new(HashEmbedder))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StudyBotError::CollectionNotFound { .. }));

        ExamStore::open(&path, "t", Arc::new(HashEmbedder)).await.unwrap();
        let err = ExamStore::open_existing(&path, "other", Arc::new(HashEmbedder))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StudyBotError::CollectionNotFound { .. }));

        assert!(ExamStore::open_existing(&path, "t", Arc::new(HashEmbedder)).await.is_ok());
    }

    #[tokio::test]
    async fn counts_by_year() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExamStore::open(&dir.path().join("s.sqlite"), "t", Arc::new(HashEmbedder))
            .await
            .unwrap();
        for (y, p) in [(2021, 2), (2020, 2), (2021, 3)] {
            store.upsert(&record(y, 1, p, "General", "text")).await.unwrap();
        }
        assert_eq!(store.count_by_year().await.unwrap(), vec![(2020, 1), (2021, 2)]);
    }
}
