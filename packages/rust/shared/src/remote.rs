//! Seams to the external collaborators: the document uploader and the
//! destination table store.
//!
//! Implementations live in `docbridge-google`; tests use in-memory fakes.

use crate::error::Result;
use crate::types::{CellWrite, Reference, RowRange, SheetRow, TextId};

/// Creates one remote document per text unit.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    /// Upload `content` as the document for `id` and return its reference.
    async fn upload(&self, id: &TextId, content: &str) -> Result<Reference>;
}

/// Row-oriented access to the destination table.
#[allow(async_fn_in_trait)]
pub trait TableStore {
    /// Read every row in `range`, padding rows the store omits as empty.
    async fn read_range(&self, range: &RowRange) -> Result<Vec<SheetRow>>;

    /// Apply all `writes` in a single call. Returns the number of cells the
    /// store reports as updated.
    async fn batch_write(&self, writes: &[CellWrite]) -> Result<usize>;
}
