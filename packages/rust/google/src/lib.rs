//! Google Workspace collaborators for docbridge.
//!
//! This crate provides:
//! - [`GoogleClient`]: bearer-authenticated HTTP client (the token comes from outside)
//! - [`DocsUploader`]: [`Uploader`](docbridge_shared::Uploader) backed by Google Docs
//! - [`SheetsTable`]: [`TableStore`](docbridge_shared::TableStore) backed by Google Sheets

mod client;
pub mod docs;
pub mod sheets;

pub use client::GoogleClient;
pub use docs::DocsUploader;
pub use sheets::SheetsTable;
