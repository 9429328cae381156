//! The ID → reference mapping handed from the upload phase to reconciliation.

use tracing::{info, instrument};

use docbridge_shared::{DocBridgeError, Mapping, MappingRecord, ProgressLog, ProgressStatus, Result};
use docbridge_storage::Persistence;

/// Project the `done` entries of a progress log into a mapping.
///
/// Failed and pending entries are left out. Re-exporting an unchanged log
/// yields an identical mapping.
pub fn export(log: &ProgressLog) -> Mapping {
    log.entries
        .values()
        .filter(|entry| entry.status == ProgressStatus::Done)
        .filter_map(|entry| {
            entry.reference.clone().map(|reference| MappingRecord {
                id: entry.id.clone(),
                reference,
            })
        })
        .collect()
}

/// Export `log` and persist the result, replacing any previous mapping.
#[instrument(skip_all, fields(location = %target.location()))]
pub async fn export_to<P: Persistence<Mapping>>(log: &ProgressLog, target: &P) -> Result<Mapping> {
    let mapping = export(log);
    target.save(&mapping).await?;
    info!(records = mapping.len(), "mapping exported");
    Ok(mapping)
}

/// Load the mapping for reconciliation. A missing or empty mapping is an
/// error: there would be nothing to reconcile against.
pub async fn load<P: Persistence<Mapping>>(source: &P) -> Result<Mapping> {
    let mapping = source.load().await?.ok_or_else(|| {
        DocBridgeError::validation(format!(
            "no mapping at {}; run an upload or export first",
            source.location()
        ))
    })?;
    if mapping.is_empty() {
        return Err(DocBridgeError::validation(format!(
            "mapping at {} has no entries",
            source.location()
        )));
    }
    Ok(mapping)
}
