//! libSQL-backed document storage (local file, offline mode).

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use docbridge_shared::{DocBridgeError, ProgressEntry, ProgressLog, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Persistence, ProgressPersistence, migrations};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocBridgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            path: path.to_path_buf(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub fn path(&self) -> &Path {
        &self.path
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
                        DocBridgeError::Storage(format!(
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

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Fetch the raw body stored under `key`.
    pub async fn get_document(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM documents WHERE key = ?1", params![key])
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<String>(0)
                    .map_err(|e| DocBridgeError::Storage(e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DocBridgeError::Storage(e.to_string())),
        }
    }

    /// Insert or replace the body stored under `key`.
    pub async fn put_document(&self, key: &str, body: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO documents (key, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                params![key, body, now.as_str()],
            )
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Progress entries
    // -----------------------------------------------------------------------

    /// Every progress row as `(schema_version, body)`.
    pub async fn progress_rows(&self) -> Result<Vec<(u32, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT schema_version, body FROM progress_entries ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?
        {
            let version = row
                .get::<u32>(0)
                .map_err(|e| DocBridgeError::Storage(e.to_string()))?;
            let body = row
                .get::<String>(1)
                .map_err(|e| DocBridgeError::Storage(e.to_string()))?;
            out.push((version, body));
        }
        Ok(out)
    }

    /// Insert or replace the row for one progress entry.
    pub async fn upsert_progress(
        &self,
        entry: &ProgressEntry,
        schema_version: u32,
    ) -> Result<()> {
        let body = serde_json::to_string(entry)
            .map_err(|e| DocBridgeError::Storage(format!("serialize failed: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO progress_entries (id, status, schema_version, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    schema_version = excluded.schema_version,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![
                    entry.id.as_str(),
                    entry.status.as_str(),
                    schema_version,
                    body.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Replace every progress row with the entries of `log`, atomically.
    pub async fn replace_progress(&self, log: &ProgressLog) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DocBridgeError::Storage(e.to_string()))?;

        let written = async {
            tx.execute("DELETE FROM progress_entries", params![])
                .await
                .map_err(|e| DocBridgeError::Storage(e.to_string()))?;
            for entry in log.entries.values() {
                self.upsert_progress(entry, log.schema_version).await?;
            }
            Ok::<_, DocBridgeError>(())
        }
        .await;

        match written {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| DocBridgeError::Storage(e.to_string())),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

/// A serde document stored as JSON under a fixed key in [`Storage`].
pub struct SqliteDocument<T> {
    storage: Arc<Storage>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteDocument<T> {
    pub fn new(storage: Arc<Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Persistence<T> for SqliteDocument<T>
where
    T: Serialize + DeserializeOwned,
{
    async fn load(&self) -> Result<Option<T>> {
        let Some(body) = self.storage.get_document(&self.key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&body).map(Some).map_err(|e| {
            DocBridgeError::Storage(format!("document '{}' is not valid: {e}", self.key))
        })
    }

    async fn save(&self, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)
            .map_err(|e| DocBridgeError::Storage(format!("serialize failed: {e}")))?;
        self.storage.put_document(&self.key, &body).await
    }

    fn location(&self) -> String {
        format!("{}#{}", self.storage.path().display(), self.key)
    }
}

/// Progress log stored as one row per ID, so each change is one upsert.
pub struct SqliteProgress {
    storage: Arc<Storage>,
}

impl SqliteProgress {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl Persistence<ProgressLog> for SqliteProgress {
    async fn load(&self) -> Result<Option<ProgressLog>> {
        let rows = self.storage.progress_rows().await?;
        let Some(schema_version) = rows.iter().map(|(version, _)| *version).max() else {
            return Ok(None);
        };

        let mut entries = BTreeMap::new();
        for (_, body) in rows {
            let entry: ProgressEntry = serde_json::from_str(&body).map_err(|e| {
                DocBridgeError::Storage(format!("progress row is not valid: {e}"))
            })?;
            entries.insert(entry.id.clone(), entry);
        }
        let updated_at = entries
            .values()
            .map(|entry: &ProgressEntry| entry.attempted_at)
            .max()
            .unwrap_or_else(Utc::now);
        Ok(Some(ProgressLog {
            schema_version,
            updated_at,
            entries,
        }))
    }

    async fn save(&self, value: &ProgressLog) -> Result<()> {
        self.storage.replace_progress(value).await
    }

    fn location(&self) -> String {
        format!("{}#progress_entries", self.storage.path().display())
    }
}

impl ProgressPersistence for SqliteProgress {
    async fn save_entry(&self, log: &ProgressLog, entry: &ProgressEntry) -> Result<()> {
        self.storage.upsert_progress(entry, log.schema_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_shared::{ProgressStatus, Reference, TextId};
    use uuid::Uuid;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("docbridge_test_{}.db", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn document_upsert() {
        let storage = Storage::open(&temp_db()).await.unwrap();

        assert_eq!(storage.get_document("progress").await.unwrap(), None);

        storage.put_document("progress", r#"{"a":1}"#).await.unwrap();
        storage.put_document("progress", r#"{"a":2}"#).await.unwrap();
        storage.put_document("mapping", "{}").await.unwrap();

        assert_eq!(
            storage.get_document("progress").await.unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );
        assert_eq!(storage.get_document("mapping").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let tmp = temp_db();
        {
            let storage = Arc::new(Storage::open(&tmp).await.unwrap());
            let doc: SqliteDocument<Vec<String>> = SqliteDocument::new(storage, "ids");
            doc.save(&vec!["D1".into(), "D2".into()]).await.unwrap();
        }

        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        let doc: SqliteDocument<Vec<String>> = SqliteDocument::new(storage, "ids");
        assert_eq!(doc.load().await.unwrap().unwrap().len(), 2);
        assert!(doc.location().ends_with("#ids"));
    }

    #[tokio::test]
    async fn invalid_body_is_a_storage_error() {
        let storage = Arc::new(Storage::open(&temp_db()).await.unwrap());
        storage.put_document("ids", "not json").await.unwrap();
        let doc: SqliteDocument<Vec<String>> = SqliteDocument::new(storage, "ids");
        assert!(matches!(
            doc.load().await.unwrap_err(),
            DocBridgeError::Storage(_)
        ));
    }

    fn progress_entry(id: &str, status: ProgressStatus) -> ProgressEntry {
        ProgressEntry {
            id: TextId::new(id),
            status,
            reference: (status == ProgressStatus::Done)
                .then(|| Reference(format!("https://docs.example.com/{id}"))),
            error: None,
            attempted_at: Utc::now(),
            attempts: 1,
            content_sha256: None,
        }
    }

    #[tokio::test]
    async fn progress_change_writes_one_row() {
        let storage = Arc::new(Storage::open(&temp_db()).await.unwrap());
        let progress = SqliteProgress::new(storage.clone());
        assert!(progress.load().await.unwrap().is_none());

        let mut log = ProgressLog::default();
        for n in 1..=50 {
            let entry = progress_entry(&format!("D{n}"), ProgressStatus::Done);
            log.entries.insert(entry.id.clone(), entry);
        }
        progress.save(&log).await.unwrap();

        let changed = progress_entry("D7", ProgressStatus::Failed);
        log.entries.insert(changed.id.clone(), changed.clone());
        let before = storage.conn.total_changes();
        progress.save_entry(&log, &changed).await.unwrap();
        assert_eq!(storage.conn.total_changes() - before, 1);

        let loaded = progress.load().await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 50);
        assert_eq!(
            loaded.entries[&TextId::new("D7")].status,
            ProgressStatus::Failed
        );
        assert!(progress.location().ends_with("#progress_entries"));
    }

    #[tokio::test]
    async fn full_save_replaces_all_rows() {
        let storage = Arc::new(Storage::open(&temp_db()).await.unwrap());
        let progress = SqliteProgress::new(storage);

        let mut log = ProgressLog::default();
        for id in ["D1", "D2"] {
            let entry = progress_entry(id, ProgressStatus::Done);
            log.entries.insert(entry.id.clone(), entry);
        }
        progress.save(&log).await.unwrap();

        log.entries.remove(&TextId::new("D2"));
        progress.save(&log).await.unwrap();
        let loaded = progress.load().await.unwrap().unwrap();
        assert_eq!(loaded.entries.keys().map(TextId::as_str).collect::<Vec<_>>(), vec!["D1"]);
    }

    #[tokio::test]
    async fn document_progress_is_migrated_to_rows() {
        let tmp = temp_db();
        {
            let db = libsql::Builder::new_local(&tmp).build().await.unwrap();
            let conn = db.connect().unwrap();
            conn.execute_batch(migrations::all_migrations()[0].sql)
                .await
                .unwrap();

            let mut log = ProgressLog::default();
            let entry = progress_entry("D3", ProgressStatus::Done);
            log.entries.insert(entry.id.clone(), entry);
            let body = serde_json::to_string(&log).unwrap();
            conn.execute(
                "INSERT INTO documents (key, body, updated_at) VALUES ('progress', ?1, 'now')",
                params![body.as_str()],
            )
            .await
            .unwrap();
        }

        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        assert_eq!(storage.get_document("progress").await.unwrap(), None);
        let loaded = SqliteProgress::new(storage).load().await.unwrap().unwrap();
        assert_eq!(
            loaded.entries[&TextId::new("D3")].reference.as_ref().map(Reference::as_str),
            Some("https://docs.example.com/D3")
        );
    }
}
