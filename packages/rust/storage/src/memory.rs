//! In-memory persistence for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docbridge_shared::{DocBridgeError, Result};

use crate::Persistence;

/// Holds the last saved value in memory. Clones share the same cell, so a
/// test can keep a handle while the code under test owns another.
#[derive(Clone)]
pub struct MemoryCell<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: Mutex<Option<T>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl<T: Clone> MemoryCell<T> {
    pub fn new() -> Self {
        Self::with_value(None)
    }

    /// Start with `value` already stored.
    pub fn seeded(value: T) -> Self {
        Self::with_value(Some(value))
    }

    fn with_value(value: Option<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(value),
                saves: AtomicUsize::new(0),
                fail_saves: AtomicBool::new(false),
            }),
        }
    }

    /// Current stored value.
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail with a storage error.
    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<T>> {
        // A poisoned lock only means another test thread panicked mid-save.
        self.inner
            .value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Default for MemoryCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Persistence<T> for MemoryCell<T> {
    async fn load(&self) -> Result<Option<T>> {
        Ok(self.get())
    }

    async fn save(&self, value: &T) -> Result<()> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(DocBridgeError::Storage("memory cell rejected save".into()));
        }
        *self.lock() = Some(value.clone());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
