pub mod auth;
pub mod oauth;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::router::{ActivityRecord, ActivitySink};
use crate::sheets::auth::{Session, SessionProvider};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Row index (0-based) new records are inserted at, right under the header.
const INSERT_ROW_INDEX: u32 = 1;

// ── batchUpdate request types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct BatchUpdateRequest {
    requests: Vec<Request>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Request {
    InsertRange(InsertRange),
    PasteData(PasteData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRange {
    range: GridRange,
    shift_dimension: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridRange {
    sheet_id: i64,
    start_row_index: u32,
    end_row_index: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasteData {
    data: String,
    #[serde(rename = "type")]
    paste_type: &'static str,
    delimiter: &'static str,
    coordinate: GridCoordinate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridCoordinate {
    sheet_id: i64,
    row_index: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    // Zero is omitted from API responses.
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

fn sheet_title(meta: &SpreadsheetMeta, sheet_id: i64) -> Option<&str> {
    meta.sheets
        .iter()
        .find(|sheet| sheet.properties.sheet_id == sheet_id)
        .map(|sheet| sheet.properties.title.as_str())
}

/// A1 range of the header row on the named sheet.
fn header_range(title: &str) -> String {
    format!("'{}'!A1:Z1", title.replace('\'', "''"))
}

/// Inserts a blank row under the header and pastes `values` into it.
fn append_row_request(sheet_id: i64, values: &[String]) -> BatchUpdateRequest {
    BatchUpdateRequest {
        requests: vec![
            Request::InsertRange(InsertRange {
                range: GridRange {
                    sheet_id,
                    start_row_index: INSERT_ROW_INDEX,
                    end_row_index: INSERT_ROW_INDEX + 1,
                },
                shift_dimension: "ROWS",
            }),
            Request::PasteData(PasteData {
                data: values.join(","),
                paste_type: "PASTE_NORMAL",
                delimiter: ",",
                coordinate: GridCoordinate {
                    sheet_id,
                    row_index: INSERT_ROW_INDEX,
                },
            }),
        ],
    }
}

// ── Client ─────────────────────────────────────────────────────────────────────

pub struct SheetsClient {
    client: reqwest::Client,
    sessions: Arc<SessionProvider>,
    spreadsheet_id: String,
    sheet_id: i64,
}

impl SheetsClient {
    pub fn new(config: &Config, sessions: Arc<SessionProvider>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            sessions,
            spreadsheet_id: config.sheets.spreadsheet_id.clone(),
            sheet_id: config.sheet_id()?,
        })
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API).context("Invalid Sheets API base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets API base URL cannot have path segments"))?
            .push(&self.spreadsheet_id)
            .extend(tail);
        Ok(url)
    }

    /// Appends one row as a single batchUpdate. Not idempotent.
    pub async fn append_row(&self, session: &Session, values: &[String]) -> Result<()> {
        let mut url = self.spreadsheet_url(&[])?;
        // `:batchUpdate` is a method suffix on the last segment, not a new segment.
        let path = format!("{}:batchUpdate", url.path());
        url.set_path(&path);

        debug!("Sending batchUpdate to Sheets API: {}", url);

        let response = self
            .client
            .post(url)
            .header("Authorization", session.bearer())
            .json(&append_row_request(self.sheet_id, values))
            .send()
            .await
            .context("Failed to send request to Sheets API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("Sheets API error ({}): {}", status, error_body);
        }
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        session: &Session,
        url: Url,
    ) -> Result<T> {
        debug!("Reading from Sheets API: {}", url);

        let response = self
            .client
            .get(url)
            .header("Authorization", session.bearer())
            .send()
            .await
            .context("Failed to send request to Sheets API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            bail!("Sheets API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse Sheets API response")
    }

    /// Reads the cell values of an A1-notation range.
    pub async fn get_values(&self, session: &Session, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.spreadsheet_url(&["values", range])?;
        let range: ValueRange = self.get_json(session, url).await?;
        Ok(range.values)
    }

    /// Title of the configured sheet, looked up by its numeric id.
    pub async fn sheet_title(&self, session: &Session) -> Result<String> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");
        let meta: SpreadsheetMeta = self.get_json(session, url).await?;
        sheet_title(&meta, self.sheet_id)
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "Spreadsheet {} has no sheet with id {}",
                    self.spreadsheet_id, self.sheet_id
                )
            })
    }

    /// Header row of the configured sheet, used to check access at startup.
    pub async fn header_row(&self) -> Result<Vec<String>> {
        let session = self.sessions.acquire().await?;
        let title = self.sheet_title(&session).await?;
        let rows = self.get_values(&session, &header_range(&title)).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl ActivitySink for SheetsClient {
    async fn append(&self, record: &ActivityRecord) -> Result<()> {
        let session = self.sessions.acquire().await?;
        self.append_row(&session, &record.values()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_row_request_shape() {
        let values = vec![
            "2026-10-18T08:15:00".to_string(),
            "🏠 пописала дома".to_string(),
        ];
        let body = serde_json::to_value(append_row_request(123, &values)).unwrap();

        assert_eq!(
            body,
            json!({
                "requests": [
                    {
                        "insertRange": {
                            "range": {
                                "sheetId": 123,
                                "startRowIndex": 1,
                                "endRowIndex": 2
                            },
                            "shiftDimension": "ROWS"
                        }
                    },
                    {
                        "pasteData": {
                            "data": "2026-10-18T08:15:00,🏠 пописала дома",
                            "type": "PASTE_NORMAL",
                            "delimiter": ",",
                            "coordinate": {
                                "sheetId": 123,
                                "rowIndex": 1
                            }
                        }
                    }
                ]
            })
        );
    }

    #[test]
    fn test_sheet_title_matches_configured_id() {
        let meta: SpreadsheetMeta = serde_json::from_str(
            r#"{"sheets":[
                {"properties":{"title":"Лог"}},
                {"properties":{"sheetId":123,"title":"Прогулки"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(sheet_title(&meta, 123), Some("Прогулки"));
        assert_eq!(sheet_title(&meta, 0), Some("Лог"));
        assert_eq!(sheet_title(&meta, 7), None);
    }

    #[test]
    fn test_header_range_quotes_title() {
        assert_eq!(header_range("Sheet1"), "'Sheet1'!A1:Z1");
        assert_eq!(header_range("Zoe's log"), "'Zoe''s log'!A1:Z1");
    }

    #[test]
    fn test_value_range_without_values() {
        let range: ValueRange =
            serde_json::from_str(r#"{"range":"Sheet1!A1:Z1","majorDimension":"ROWS"}"#).unwrap();
        assert!(range.values.is_empty());
    }
}
