use facecheck_core::FaceProfile;
use facecheck_store::{FaceRepo, StoreError};
use std::path::Path;

/// Async access to the face store, backed by a `tokio-rusqlite` connection thread.
#[derive(Clone)]
pub struct FaceDb {
    conn: tokio_rusqlite::Connection,
}

impl FaceDb {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, tokio_rusqlite::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, tokio_rusqlite::Error> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, tokio_rusqlite::Error> {
        let db = Self { conn };
        db.call(FaceRepo::migrate).await?;
        Ok(db)
    }

    async fn call<T, F>(&self, f: F) -> Result<T, tokio_rusqlite::Error>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        self.conn
            .call(move |c| f(c).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e))))
            .await
    }

    pub async fn add(&self, profile: FaceProfile) -> Result<(), tokio_rusqlite::Error> {
        self.call(move |c| FaceRepo::add(c, &profile)).await
    }

    pub async fn load_all(&self) -> Result<Vec<FaceProfile>, tokio_rusqlite::Error> {
        self.call(FaceRepo::load_all).await
    }

    pub async fn remove(&self, id: &str) -> Result<bool, tokio_rusqlite::Error> {
        let id = id.to_string();
        self.call(move |c| FaceRepo::remove(c, &id)).await
    }

    pub async fn clear(&self) -> Result<usize, tokio_rusqlite::Error> {
        self.call(FaceRepo::clear).await
    }
}
