//! JSON file persistence with atomic replacement.

use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use docbridge_shared::{DocBridgeError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Persistence;

/// A document stored as JSON at `path`.
///
/// Saves write a sibling temp file, fsync it, then rename it over the target,
/// so a crash leaves either the previous or the new document, never a torn one.
pub struct JsonFile<T> {
    path: PathBuf,
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T> {
    /// Pretty-printed document, for artifacts people read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
            _marker: PhantomData,
        }
    }

    /// Single-line document, for artifacts rewritten often.
    pub fn compact(path: impl Into<PathBuf>) -> Self {
        Self {
            pretty: false,
            ..Self::new(path)
        }
    }
}

impl<T> Persistence<T> for JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    async fn load(&self) -> Result<Option<T>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no document yet");
                return Ok(None);
            }
            Err(e) => return Err(DocBridgeError::io(&self.path, e)),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            DocBridgeError::Storage(format!("{} is not valid: {e}", self.path.display()))
        })
    }

    async fn save(&self, value: &T) -> Result<()> {
        let serialized = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        let mut body =
            serialized.map_err(|e| DocBridgeError::Storage(format!("serialize failed: {e}")))?;
        body.push(b'\n');

        write_atomic(&self.path, &body)?;
        debug!(path = %self.path.display(), bytes = body.len(), "document saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Sibling temp file used while replacing `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Replace `path` with `body`: write a temp file, fsync, rename, fsync the
/// directory.
pub(crate) fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DocBridgeError::io(parent, e))?;
    }

    let temp = temp_path(path);
    {
        let mut file = File::create(&temp).map_err(|e| DocBridgeError::io(&temp, e))?;
        file.write_all(body)
            .and_then(|()| file.sync_all())
            .map_err(|e| DocBridgeError::io(&temp, e))?;
    }

    std::fs::rename(&temp, path).map_err(|e| DocBridgeError::io(path, e))?;

    // Persist the rename itself; not supported on every platform.
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
