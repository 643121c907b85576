//! Blob storage for Slidecast artifacts.
//!
//! The pipeline only needs a key-addressed byte store: [`BlobStore`].
//! [`Storage`] provides it on top of an embedded libSQL database;
//! [`MemoryBlobStore`] keeps everything in process for tests.
//!
//! **Access rules:**
//! - pipeline commands: read-write via [`Storage::open`]
//! - inspection commands: read-only via [`Storage::open_readonly`]

mod layout;
mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use slidecast_shared::{Result, SlidecastError};

pub use layout::PresentationLayout;
pub use memory::MemoryBlobStore;

/// Key-addressed byte store used for every pipeline artifact.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. An absent key is [`SlidecastError::MissingArtifact`].
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Create or replace a blob.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// libSQL-backed blob store.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SlidecastError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SlidecastError::Storage(format!(
                "no blob database at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SlidecastError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SlidecastError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// List `(key, size)` pairs whose key starts with `prefix`, in key order.
    pub async fn list(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, size FROM blobs WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
                params![prefix],
            )
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?
        {
            let key: String = row
                .get(0)
                .map_err(|e| SlidecastError::Storage(e.to_string()))?;
            let size: i64 = row
                .get(1)
                .map_err(|e| SlidecastError::Storage(e.to_string()))?;
            entries.push((key, size.max(0) as u64));
        }
        Ok(entries)
    }
}

#[async_trait]
impl BlobStore for Storage {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut rows = self
            .conn
            .query("SELECT data FROM blobs WHERE key = ?1", params![key])
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<Vec<u8>>(0)
                .map_err(|e| SlidecastError::Storage(e.to_string())),
            Ok(None) => Err(SlidecastError::missing(key)),
            Err(e) => Err(SlidecastError::Storage(e.to_string())),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO blobs (key, data, size, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   data = excluded.data,
                   size = excluded.size,
                   updated_at = excluded.updated_at",
                params![key, data.to_vec(), data.len() as i64, now.as_str()],
            )
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;
        tracing::debug!(key, bytes = data.len(), "blob written");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM blobs WHERE key = ?1", params![key])
            .await
            .map_err(|e| SlidecastError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(SlidecastError::Storage(e.to_string())),
        }
    }
}
