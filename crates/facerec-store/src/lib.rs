//! facerec-store — append-only SQLite persistence for registered faces.
//!
//! Each request opens its own [`StoreSession`] and closes it when done;
//! [`FaceStore`] only remembers where the database lives.

use chrono::{DateTime, Utc};
use facerec_core::{Embedding, FaceRecord};
use rusqlite::params;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    encoding      TEXT NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("could not encode embedding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no face database at {}", .0.display())]
    NotFound(PathBuf),
    #[error("refusing to store non-finite embedding for {name}")]
    NonFinite { name: String },
    #[error("stored embedding for record {id} is corrupt: {source}")]
    CorruptEmbedding {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored timestamp for record {id} is invalid: {source}")]
    BadTimestamp {
        id: i64,
        #[source]
        source: chrono::ParseError,
    },
}

/// Handle to the face database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FaceStore {
    path: PathBuf,
}

impl FaceStore {
    /// Create the database file and table if missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { path };
        let session = store.session().await?;
        let journal_mode = session
            .conn
            .call(|conn| {
                let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
                conn.execute_batch(SCHEMA)?;
                Ok(mode)
            })
            .await?;
        session.close().await?;
        tracing::debug!(%journal_mode, "face table ready");

        tracing::info!(path = %store.path.display(), "face store opened");
        Ok(store)
    }

    /// Open a database that must already exist. Nothing is created.
    pub async fn open_existing(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.is_file() {
            return Err(StoreError::NotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection scoped to the caller.
    pub async fn session(&self) -> Result<StoreSession, StoreError> {
        let conn = tokio_rusqlite::Connection::open(&self.path).await?;
        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        })
        .await?;
        Ok(StoreSession { conn })
    }
}

/// A single open connection. Dropping it closes the connection.
pub struct StoreSession {
    conn: tokio_rusqlite::Connection,
}

/// Row as stored, before the embedding and timestamp are decoded.
struct RawFace {
    id: i64,
    name: String,
    encoding: String,
    model_version: Option<String>,
    created_at: String,
}

impl RawFace {
    fn decode(self) -> Result<FaceRecord, StoreError> {
        let values: Vec<f32> = serde_json::from_str(&self.encoding)
            .map_err(|source| StoreError::CorruptEmbedding { id: self.id, source })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|source| StoreError::BadTimestamp { id: self.id, source })?
            .with_timezone(&Utc);

        Ok(FaceRecord {
            id: self.id,
            name: self.name,
            embedding: Embedding {
                values,
                model_version: self.model_version,
            },
            created_at,
        })
    }
}

impl StoreSession {
    /// Append a record and return it with its assigned id.
    ///
    /// Non-finite components are refused; JSON would store them as `null`.
    pub async fn insert(&self, name: &str, embedding: &Embedding) -> Result<FaceRecord, StoreError> {
        if !embedding.is_finite() {
            return Err(StoreError::NonFinite { name: name.to_string() });
        }
        let encoding = serde_json::to_string(&embedding.values)?;
        let created_at = Utc::now();

        let row_name = name.to_string();
        let model_version = embedding.model_version.clone();
        let stamp = created_at.to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO faces (name, encoding, model_version, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![row_name, encoding, model_version, stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(FaceRecord {
            id,
            name: name.to_string(),
            embedding: embedding.clone(),
            created_at,
        })
    }

    /// Every record, lowest id first.
    pub async fn load_all(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, encoding, model_version, created_at FROM faces ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RawFace {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            encoding: row.get(2)?,
                            model_version: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawFace::decode).collect()
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
                Ok(n)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Close the connection, surfacing any error from SQLite.
    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store() -> (TempDir, FaceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FaceStore::open(dir.path().join("nested/faces.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_parent_and_table() {
        let (_dir, store) = temp_store().await;
        assert!(store.path().exists());

        let session = store.session().await.unwrap();
        assert_eq!(session.count().await.unwrap(), 0);
        assert!(session.load_all().await.unwrap().is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (_dir, store) = temp_store().await;
        let session = store.session().await.unwrap();
        session.insert("Alice", &Embedding::new(vec![0.5, 0.25])).await.unwrap();
        session.close().await.unwrap();

        let reopened = FaceStore::open(store.path()).await.unwrap();
        let session = reopened.session().await.unwrap();
        assert_eq!(session.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_existing_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("typo/faces.db");

        let err = FaceStore::open_existing(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{err}");
        assert!(!missing.exists());
        assert!(!dir.path().join("typo").exists());

        let created = FaceStore::open(dir.path().join("faces.db")).await.unwrap();
        let existing = FaceStore::open_existing(created.path()).await.unwrap();
        let session = existing.session().await.unwrap();
        assert_eq!(session.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_load_in_id_order() {
        let (_dir, store) = temp_store().await;
        let session = store.session().await.unwrap();

        let mut tagged = Embedding::new(vec![0.125, -0.5, 1.0]);
        tagged.model_version = Some("w600k_r50".into());

        let first = session.insert("Bob", &tagged).await.unwrap();
        let second = session.insert("Bob", &Embedding::new(vec![0.0, 0.0, 0.75])).await.unwrap();
        assert!(second.id > first.id);

        let records = session.load_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, first.id);
        assert_eq!(records[0].name, "Bob");
        assert_eq!(records[0].embedding, tagged);
        assert_eq!(records[1].embedding.values, vec![0.0, 0.0, 0.75]);
        assert_eq!(records[1].embedding.model_version, None);
        assert_eq!(records[0].created_at.timestamp(), first.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_non_finite_embedding_is_rejected() {
        let (_dir, store) = temp_store().await;
        let session = store.session().await.unwrap();
        session.insert("Alice", &Embedding::new(vec![0.1, 0.2])).await.unwrap();

        let err = session
            .insert("Eve", &Embedding::new(vec![f32::NAN, 0.2]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NonFinite { .. }), "{err}");
        let err = session
            .insert("Eve", &Embedding::new(vec![f32::INFINITY, 0.2]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NonFinite { .. }), "{err}");

        let records = session.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Alice");
    }

    #[tokio::test]
    async fn test_sessions_see_each_others_writes() {
        let (_dir, store) = temp_store().await;

        let writer = store.session().await.unwrap();
        writer.insert("Carol", &Embedding::new(vec![1.0])).await.unwrap();
        writer.close().await.unwrap();

        let reader = store.session().await.unwrap();
        let records = reader.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Carol");
    }

    #[tokio::test]
    async fn test_corrupt_encoding_is_reported() {
        let (_dir, store) = temp_store().await;

        let raw = rusqlite::Connection::open(store.path()).unwrap();
        raw.execute(
            "INSERT INTO faces (name, encoding, created_at) VALUES ('Mallory', 'not json', ?1)",
            params![Utc::now().to_rfc3339()],
        )
        .unwrap();
        drop(raw);

        let session = store.session().await.unwrap();
        let err = session.load_all().await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptEmbedding { id: 1, .. }), "{err}");
    }
}
