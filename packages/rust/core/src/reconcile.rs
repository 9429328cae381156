//! Table reconciliation: fill empty destination cells from the mapping.

use tracing::{debug, info, instrument};

use docbridge_shared::{
    CellWrite, DiscrepancyRecord, DiscrepancyReport, Mapping, Result, RowRange, SheetRow,
    TableStore, TextId,
};
use docbridge_storage::Persistence;

use crate::discrepancy::DiscrepancyTracker;

/// What reconciliation would do for a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub writes: Vec<CellWrite>,
    pub discrepancies: Vec<DiscrepancyRecord>,
    /// Rows left alone because the destination already holds a value.
    pub skipped_existing: usize,
    /// Rows with no ID.
    pub blank_ids: usize,
}

/// Decide, row by row, what to write and what to report.
///
/// A non-empty destination cell is final: the row is skipped whatever the
/// mapping says, and is not reported as a discrepancy either.
pub fn plan(rows: &[SheetRow], mapping: &Mapping, destination_column: &str) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    for row in rows {
        if !row.destination_cell.trim().is_empty() {
            plan.skipped_existing += 1;
            continue;
        }

        let id = TextId::new(&row.id_cell);
        if id.is_empty() {
            plan.blank_ids += 1;
            continue;
        }

        match mapping.get(&id) {
            Some(reference) => plan.writes.push(CellWrite {
                row_index: row.row_index,
                column: destination_column.to_string(),
                value: reference.to_string(),
            }),
            None => plan.discrepancies.push(DiscrepancyRecord {
                id,
                row_index: row.row_index,
            }),
        }
    }
    plan
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub rows: RowRange,
    pub rows_read: usize,
    pub plan: ReconcilePlan,
    /// Cells the table store reports as updated. Zero on a dry run.
    pub updated_cells: usize,
    pub dry_run: bool,
}

/// Reads rows from a [`TableStore`] and writes references back.
pub struct TableReconciler<T> {
    table: T,
    destination_column: String,
}

impl<T: TableStore> TableReconciler<T> {
    pub fn new(table: T, destination_column: impl Into<String>) -> Self {
        Self {
            table,
            destination_column: destination_column.into(),
        }
    }

    /// Reconcile `rows` against `mapping`.
    ///
    /// Discrepancies are persisted through `tracker` before the batch write
    /// is issued. A dry run reads the table and computes the plan but writes
    /// nothing, neither to the table nor to the report.
    #[instrument(skip_all, fields(start = rows.start, end = rows.end, dry_run = dry_run))]
    pub async fn reconcile<P>(
        &self,
        mapping: &Mapping,
        rows: RowRange,
        tracker: &DiscrepancyTracker<P>,
        dry_run: bool,
    ) -> Result<ReconcileReport>
    where
        P: Persistence<DiscrepancyReport>,
    {
        let sheet_rows = self.table.read_range(&rows).await?;
        debug!(rows = sheet_rows.len(), "rows read");

        let plan = plan(&sheet_rows, mapping, &self.destination_column);
        info!(
            writes = plan.writes.len(),
            skipped_existing = plan.skipped_existing,
            discrepancies = plan.discrepancies.len(),
            blank = plan.blank_ids,
            "reconciliation planned"
        );

        let mut report = ReconcileReport {
            rows,
            rows_read: sheet_rows.len(),
            plan,
            updated_cells: 0,
            dry_run,
        };
        if dry_run {
            return Ok(report);
        }

        tracker
            .report(rows, report.plan.discrepancies.clone())
            .await?;
        report.updated_cells = self.table.batch_write(&report.plan.writes).await?;
        info!(updated_cells = report.updated_cells, "batch write applied");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_shared::{MappingRecord, Reference};

    fn row(index: u32, id: &str, dest: &str) -> SheetRow {
        SheetRow {
            row_index: index,
            id_cell: id.into(),
            destination_cell: dest.into(),
        }
    }

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(id, r)| MappingRecord {
                id: TextId::new(id),
                reference: Reference(r.to_string()),
            })
            .collect()
    }

    #[test]
    fn plan_fills_empty_mapped_rows() {
        let rows = vec![
            row(2, "D1", ""),
            row(3, "D2", "existing"),
            row(4, "D5", ""),
        ];
        let plan = plan(&rows, &mapping(&[("D1", "refA"), ("D2", "refB")]), "L");

        assert_eq!(
            plan.writes,
            vec![CellWrite {
                row_index: 2,
                column: "L".into(),
                value: "refA".into()
            }]
        );
        assert_eq!(plan.skipped_existing, 1);
        assert_eq!(
            plan.discrepancies,
            vec![DiscrepancyRecord {
                id: "D5".into(),
                row_index: 4
            }]
        );
    }

    #[test]
    fn duplicate_ids_each_get_written() {
        let rows = vec![row(2, "D1", ""), row(9, "D1", "")];
        let plan = plan(&rows, &mapping(&[("D1", "refA")]), "L");
        let targets: Vec<u32> = plan.writes.iter().map(|w| w.row_index).collect();
        assert_eq!(targets, vec![2, 9]);
    }

    #[test]
    fn blank_ids_are_ignored_and_ids_trimmed() {
        let rows = vec![row(2, "  ", ""), row(3, " D1 ", ""), row(4, "", "")];
        let plan = plan(&rows, &mapping(&[("D1", "refA")]), "L");
        assert_eq!(plan.blank_ids, 2);
        assert_eq!(plan.writes.len(), 1);
        assert!(plan.discrepancies.is_empty());
    }

    #[test]
    fn unmapped_duplicate_rows_are_each_reported() {
        let rows = vec![row(2, "D7", ""), row(3, "D7", "")];
        let plan = plan(&rows, &Mapping::default(), "L");
        assert_eq!(plan.discrepancies.len(), 2);
    }
}
