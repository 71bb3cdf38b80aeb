//! libSQL-backed [`rag_core::persistence::PersistenceAdapter`].
//!
//! `file:`/`:memory:` for local development and tests, `libsql://` with
//! a bearer token for a managed remote database. Embedded-replica sync
//! and connection pooling are out of scope here — the request-
//! fulfillment core issues one point query per call and holds no cursor
//! across an await point, so a single shared `Database` handle (libSQL
//! multiplexes connections internally) is sufficient.

mod schema;
mod storage;

use std::sync::Arc;

use libsql::{Builder, Database};
use rag_core::error::{Error, Result};
use tracing::info;

/// Owns the libSQL `Database` handle and applies the schema once at
/// construction.
pub struct SqlStorage {
    db: Arc<Database>,
}

impl SqlStorage {
    /// Connect and migrate. `url` must be `libsql://`, `file:` or
    /// `:memory:`; remote connections require a non-empty `token`.
    pub async fn connect(url: &str, token: &str) -> Result<Self> {
        if !url.starts_with("libsql://") && !url.starts_with("file:") && !url.starts_with(":memory:") {
            return Err(Error::Configuration(format!(
                "insecure database url: {url}. Only libsql://, file:, or :memory: are allowed"
            )));
        }
        if url.starts_with("libsql://") && token.trim().is_empty() {
            return Err(Error::Configuration("authentication token required for remote libsql connections".into()));
        }

        info!(%url, "connecting to libsql database");

        let db = if url.starts_with("libsql://") {
            Builder::new_remote(url.to_string(), token.to_string())
                .build()
                .await
                .map_err(|e| Error::Dependency(format!("failed to connect to libsql: {e}")))?
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path).build().await.map_err(|e| Error::Dependency(format!("failed to connect to libsql: {e}")))?
        };

        let storage = Self { db: Arc::new(db) };
        storage.migrate().await?;
        Ok(storage)
    }

    /// Build against an in-process `:memory:` database, for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(":memory:", "").await
    }

    async fn migrate(&self) -> Result<()> {
        let conn = self.db.connect().map_err(|e| Error::Dependency(format!("libsql connect: {e}")))?;
        for statement in schema::SCHEMA_STATEMENTS {
            conn.execute(statement, ()).await.map_err(|e| Error::Dependency(format!("schema migration failed: {e}")))?;
        }
        Ok(())
    }

    fn connection(&self) -> Result<libsql::Connection> {
        self.db.connect().map_err(|e| Error::Dependency(format!("libsql connect: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_insecure_url() {
        let err = SqlStorage::connect("http://example.com", "").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn connect_rejects_missing_remote_token() {
        let err = SqlStorage::connect("libsql://example.com", "").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn in_memory_connects_and_migrates() {
        let storage = SqlStorage::in_memory().await.unwrap();
        let conn = storage.connection().unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM users", ()).await.unwrap();
        assert!(rows.next().await.unwrap().is_some());
    }
}
