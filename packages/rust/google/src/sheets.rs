//! Google Sheets table store: reads the ID/destination columns of a row range
//! and writes references back in one batch.

use docbridge_shared::{
    CellWrite, DocBridgeError, Result, RowRange, SheetLayout, SheetRow, TableStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::client::{GoogleClient, endpoint, json, send};

/// One tab of a spreadsheet, addressed through a fixed [`SheetLayout`].
pub struct SheetsTable {
    client: GoogleClient,
    layout: SheetLayout,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateResponse {
    #[serde(default)]
    total_updated_cells: usize,
}

impl SheetsTable {
    pub fn new(client: GoogleClient, layout: SheetLayout) -> Self {
        Self { client, layout }
    }

    /// A1 range spanning the ID column to the destination column.
    fn read_a1(&self, range: &RowRange) -> String {
        format!(
            "{}!{}{}:{}{}",
            quote_tab(&self.layout.tab),
            self.layout.id_column,
            range.start,
            self.layout.destination_column,
            range.end
        )
    }

    fn cell_a1(&self, column: &str, row: u32) -> String {
        format!("{}!{column}{row}", quote_tab(&self.layout.tab))
    }
}

impl TableStore for SheetsTable {
    #[instrument(skip_all, fields(start = range.start, end = range.end))]
    async fn read_range(&self, range: &RowRange) -> Result<Vec<SheetRow>> {
        let a1 = self.read_a1(range);
        let url = endpoint(
            &self.client.sheets_base,
            &["v4", "spreadsheets", &self.layout.spreadsheet_id, "values", &a1],
        );
        let response = send(self.client.get(url), "read range").await?;
        let body: ValueRange = json(response, "read range").await?;

        // The API drops trailing empty rows and cells; pad them back.
        let offset = self.layout.destination_offset();
        let rows = (range.start..=range.end)
            .enumerate()
            .map(|(i, row_index)| {
                let cells = body.values.get(i);
                SheetRow {
                    row_index,
                    id_cell: cells.and_then(|c| c.first()).map(cell_text).unwrap_or_default(),
                    destination_cell: cells
                        .and_then(|c| c.get(offset))
                        .map(cell_text)
                        .unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        debug!(range = %a1, rows = rows.len(), returned = body.values.len(), "read sheet range");
        Ok(rows)
    }

    #[instrument(skip_all, fields(writes = writes.len()))]
    async fn batch_write(&self, writes: &[CellWrite]) -> Result<usize> {
        if writes.is_empty() {
            return Ok(0);
        }

        let data: Vec<Value> = writes
            .iter()
            .map(|w| {
                json!({
                    "range": self.cell_a1(&w.column, w.row_index),
                    "values": [[w.value]],
                })
            })
            .collect();

        let url = endpoint(
            &self.client.sheets_base,
            &["v4", "spreadsheets", &self.layout.spreadsheet_id, "values:batchUpdate"],
        );
        let body = json!({ "valueInputOption": "RAW", "data": data });

        let response = send(self.client.post(url).json(&body), "batch update")
            .await
            .map_err(|e| DocBridgeError::TableWrite(e.to_string()))?;
        let result: BatchUpdateResponse = json(response, "batch update")
            .await
            .map_err(|e| DocBridgeError::TableWrite(e.to_string()))?;

        Ok(result.total_updated_cells)
    }
}

/// Quote a tab name for A1 notation (`My Tab` → `'My Tab'`).
fn quote_tab(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_shared::GoogleConfig;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn layout() -> SheetLayout {
        SheetLayout {
            spreadsheet_id: "sheet-1".into(),
            tab: "Tengyur".into(),
            id_column: "J".into(),
            destination_column: "L".into(),
        }
    }

    fn table(server: &MockServer) -> SheetsTable {
        let config = GoogleConfig {
            sheets_api_base: server.uri(),
            ..GoogleConfig::default()
        };
        SheetsTable::new(GoogleClient::new(&config, "tok").unwrap(), layout())
    }

    #[test]
    fn tab_quoting() {
        assert_eq!(quote_tab("Sheet1"), "'Sheet1'");
        assert_eq!(quote_tab("Bob's tab"), "'Bob''s tab'");
    }

    #[tokio::test]
    async fn read_range_pads_missing_rows_and_cells() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/'Tengyur'!J2:L5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Tengyur!J2:L5",
                "majorDimension": "ROWS",
                "values": [
                    ["D1"],
                    ["D2", "", "https://existing"],
                    ["", "note"]
                ]
            })))
            .mount(&server)
            .await;

        let rows = table(&server)
            .read_range(&RowRange::new(2, 5).unwrap())
            .await
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].row_index, 2);
        assert_eq!(rows[0].id_cell, "D1");
        assert_eq!(rows[0].destination_cell, "");
        assert_eq!(rows[1].destination_cell, "https://existing");
        assert_eq!(rows[2].id_cell, "");
        assert_eq!(rows[3].row_index, 5);
        assert_eq!(rows[3].id_cell, "");
    }

    #[tokio::test]
    async fn batch_write_sends_single_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
            .and(body_json(json!({
                "valueInputOption": "RAW",
                "data": [
                    { "range": "'Tengyur'!L2", "values": [["https://ref/a"]] },
                    { "range": "'Tengyur'!L7", "values": [["https://ref/b"]] }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "totalUpdatedCells": 2 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let writes = vec![
            CellWrite {
                row_index: 2,
                column: "L".into(),
                value: "https://ref/a".into(),
            },
            CellWrite {
                row_index: 7,
                column: "L".into(),
                value: "https://ref/b".into(),
            },
        ];
        assert_eq!(table(&server).batch_write(&writes).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(table(&server).batch_write(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_batch_is_table_write_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Unable to parse range" }
            })))
            .mount(&server)
            .await;

        let writes = vec![CellWrite {
            row_index: 2,
            column: "L".into(),
            value: "x".into(),
        }];
        let err = table(&server).batch_write(&writes).await.unwrap_err();
        assert!(matches!(err, DocBridgeError::TableWrite(_)));
        assert!(err.to_string().contains("Unable to parse range"));
    }
}
