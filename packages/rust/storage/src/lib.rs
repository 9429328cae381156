//! Persistence layer for docbridge's durable artifacts.
//!
//! The mapping and the discrepancy report are serde documents loaded and
//! saved whole through the [`Persistence`] trait:
//! - [`JsonFile`]: JSON on disk, replaced atomically on every save
//! - [`SqliteDocument`]: a keyed row in a libSQL database ([`Storage`])
//! - [`MemoryCell`]: in-memory, for tests
//!
//! [`Backend`] picks between the on-disk variants from the configured path.
//! The progress log changes once per attempt and goes through
//! [`ProgressPersistence`] instead, with [`ProgressBackend`] as its selector.

mod json;
mod memory;
mod migrations;
mod progress;
mod sqlite;

use std::path::Path;

use docbridge_shared::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use json::JsonFile;
pub use memory::MemoryCell;
pub use progress::{ProgressBackend, ProgressJournal, ProgressPersistence};
pub use sqlite::{SqliteDocument, SqliteProgress, Storage};

/// Load/save capability for one persisted document.
///
/// `save` returns only after the value is durable; callers rely on this to
/// advance past a recorded step.
#[allow(async_fn_in_trait)]
pub trait Persistence<T> {
    /// Read the stored value. A missing document is `Ok(None)`, not an error.
    async fn load(&self) -> Result<Option<T>>;

    /// Replace the stored value.
    async fn save(&self, value: &T) -> Result<()>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// On-disk persistence selected by path extension.
pub enum Backend<T> {
    Json(JsonFile<T>),
    Sqlite(SqliteDocument<T>),
}

impl<T> Backend<T> {
    /// Open the backend for `path`. `.db` and `.sqlite` files use libSQL with
    /// the document stored under `key`; anything else is a JSON file.
    pub async fn open(path: &Path, key: &str) -> Result<Self> {
        if is_sqlite_path(path) {
            let storage = Storage::open(path).await?;
            Ok(Self::Sqlite(SqliteDocument::new(storage.into(), key)))
        } else {
            Ok(Self::Json(JsonFile::new(path)))
        }
    }
}

/// Whether `path` names a libSQL database file.
pub(crate) fn is_sqlite_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    )
}

impl<T> Persistence<T> for Backend<T>
where
    T: Serialize + DeserializeOwned,
{
    async fn load(&self) -> Result<Option<T>> {
        match self {
            Self::Json(inner) => inner.load().await,
            Self::Sqlite(inner) => inner.load().await,
        }
    }

    async fn save(&self, value: &T) -> Result<()> {
        match self {
            Self::Json(inner) => inner.save(value).await,
            Self::Sqlite(inner) => inner.save(value).await,
        }
    }

    fn location(&self) -> String {
        match self {
            Self::Json(inner) => Persistence::<T>::location(inner),
            Self::Sqlite(inner) => Persistence::<T>::location(inner),
        }
    }
}
