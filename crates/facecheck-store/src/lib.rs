//! facecheck-store — SQLite persistence for enrolled faces.
//!
//! [`FaceRepo`] is stateless: every method takes a `&Connection`, so callers
//! decide how the connection is owned (directly, or behind `tokio-rusqlite`).
//! Embeddings are stored as little-endian `f32` blobs.

use chrono::{DateTime, Utc};
use facecheck_core::{Embedding, FaceProfile, EMBEDDING_DIM};
use rusqlite::{params, Connection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid embedding for {name}: expected {EMBEDDING_DIM} dimensions, got {dim}")]
    InvalidEmbedding { name: String, dim: usize },
    #[error("embedding for {name} is not unit length (norm {norm})")]
    NotNormalized { name: String, norm: f32 },
    #[error("employee name must not be empty")]
    EmptyName,
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    name       TEXT NOT NULL,
    embedding  BLOB NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Face profile repository.
pub struct FaceRepo;

impl FaceRepo {
    /// Create the schema if it does not exist.
    pub fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Persist a new profile.
    pub fn add(conn: &Connection, profile: &FaceProfile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(StoreError::EmptyName);
        }
        if !profile.embedding.is_valid() {
            return Err(StoreError::InvalidEmbedding {
                name: profile.name.clone(),
                dim: profile.embedding.dim(),
            });
        }
        if !profile.embedding.is_unit() {
            return Err(StoreError::NotNormalized {
                name: profile.name.clone(),
                norm: profile.embedding.norm(),
            });
        }

        conn.execute(
            "INSERT INTO faces (id, name, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id,
                profile.name,
                encode_embedding(&profile.embedding),
                profile.registered_at.to_rfc3339()
            ],
        )?;
        tracing::info!(id = %profile.id, name = %profile.name, "face profile stored");
        Ok(())
    }

    /// Load every valid profile in registration order.
    ///
    /// Rows with a malformed embedding or timestamp are skipped with a warning.
    pub fn load_all(conn: &Connection) -> Result<Vec<FaceProfile>> {
        let mut stmt =
            conn.prepare("SELECT id, name, embedding, created_at FROM faces ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut profiles = Vec::new();
        let mut total = 0usize;
        for row in rows {
            let (id, name, blob, created_at) = row?;
            total += 1;

            let Some(embedding) = decode_embedding(&blob).filter(|e| e.is_valid() && e.is_unit()) else {
                tracing::warn!(%id, %name, bytes = blob.len(), "skipping face with invalid embedding");
                continue;
            };
            let Ok(registered_at) = DateTime::parse_from_rfc3339(&created_at) else {
                tracing::warn!(%id, %name, %created_at, "skipping face with invalid timestamp");
                continue;
            };

            profiles.push(FaceProfile {
                id,
                name,
                embedding,
                registered_at: registered_at.with_timezone(&Utc),
            });
        }

        tracing::debug!(valid = profiles.len(), total, "loaded face profiles");
        Ok(profiles)
    }

    /// Remove one profile. Returns false when the id was unknown.
    pub fn remove(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM faces WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Remove every profile, returning how many were deleted.
    pub fn clear(conn: &Connection) -> Result<usize> {
        let changed = conn.execute("DELETE FROM faces", [])?;
        tracing::info!(removed = changed, "cleared all face data");
        Ok(changed)
    }

    pub fn count(conn: &Connection) -> Result<usize> {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM faces", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding.values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Embedding> {
    if blob.len() % 4 != 0 {
        return None;
    }
    let values = blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Some(Embedding { values })
}
