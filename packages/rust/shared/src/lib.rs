//! Shared types, error model, configuration and collaborator traits for docbridge.
//!
//! This crate is the foundation depended on by all other docbridge crates.
//! It provides:
//! - [`DocBridgeError`]: the unified error type
//! - Domain types ([`TextId`], [`ProgressEntry`], [`Mapping`], [`SheetRow`], ...)
//! - Configuration ([`AppConfig`], [`UploadConfig`], [`ReconcileConfig`], config loading)
//! - The [`Uploader`] and [`TableStore`] seams

pub mod config;
pub mod error;
pub mod remote;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GoogleConfig, PacingConfig, PathsConfig, ReconcileConfig, SheetLayout,
    SheetSection, UploadConfig, UploadSection, access_token, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{DocBridgeError, Result};
pub use remote::{TableStore, Uploader};
pub use types::{
    CURRENT_SCHEMA_VERSION, CellWrite, ContentLocator, DiscrepancyRecord, DiscrepancyReport,
    IdParts, IdRange, Mapping, MappingRecord, ProgressEntry, ProgressLog, ProgressStatus,
    Reference, RowRange, SheetRow, TextId, TextUnit,
};
