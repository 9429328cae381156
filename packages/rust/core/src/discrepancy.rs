//! Persists the rows whose IDs had no mapping entry.

use chrono::Utc;
use tracing::{info, warn};

use docbridge_shared::{CURRENT_SCHEMA_VERSION, DiscrepancyRecord, DiscrepancyReport, Result, RowRange};
use docbridge_storage::Persistence;

/// Writes the discrepancy report for each reconciliation run.
pub struct DiscrepancyTracker<P> {
    backend: P,
}

impl<P: Persistence<DiscrepancyReport>> DiscrepancyTracker<P> {
    pub fn new(backend: P) -> Self {
        Self { backend }
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// Replace the stored report with `records` for `rows`.
    ///
    /// An empty list is still written, so a stale report from an earlier
    /// run never survives.
    pub async fn report(
        &self,
        rows: RowRange,
        records: Vec<DiscrepancyRecord>,
    ) -> Result<DiscrepancyReport> {
        for record in &records {
            warn!(id = %record.id, row = record.row_index, "ID has no mapping entry");
        }

        let report = DiscrepancyReport {
            schema_version: CURRENT_SCHEMA_VERSION,
            generated_at: Utc::now(),
            rows,
            discrepancies: records,
        };
        self.backend.save(&report).await?;
        info!(
            count = report.discrepancies.len(),
            location = %self.backend.location(),
            "discrepancy report written"
        );
        Ok(report)
    }

    /// The report of the most recent run, if any.
    pub async fn last(&self) -> Result<Option<DiscrepancyReport>> {
        self.backend.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_storage::MemoryCell;

    fn record(id: &str, row: u32) -> DiscrepancyRecord {
        DiscrepancyRecord {
            id: id.into(),
            row_index: row,
        }
    }

    #[tokio::test]
    async fn report_replaces_previous_run() {
        let cell = MemoryCell::<DiscrepancyReport>::new();
        let tracker = DiscrepancyTracker::new(cell.clone());
        let rows = RowRange::new(2, 10).unwrap();

        tracker
            .report(rows, vec![record("D1", 2), record("D5", 6)])
            .await
            .unwrap();
        assert_eq!(cell.get().unwrap().discrepancies.len(), 2);

        tracker.report(rows, vec![]).await.unwrap();
        let last = tracker.last().await.unwrap().unwrap();
        assert!(last.discrepancies.is_empty());
        assert_eq!(last.rows, rows);
        assert_eq!(cell.save_count(), 2);
    }
}
