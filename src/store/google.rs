//! Google Sheets backend, speaking the Sheets REST API (v4).
//!
//! The medication table lives on the first worksheet of the spreadsheet:
//! row 1 is the header, every following row is a record. Loads read the
//! whole worksheet, saves clear it and write every row back from `A1`.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::StoreError;
use crate::record::MedicationTable;
use crate::store::SheetStore;
use crate::store::auth::Credentials;
use crate::store::rows::{decode_rows, encode_rows};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection to one spreadsheet.
pub struct GoogleSheetStore {
    agent: ureq::Agent,
    api_url: String,
    sheet_id: String,
    credentials: Credentials,
    worksheet: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetStore {
    /// Open the spreadsheet `sheet_id` and resolve its first worksheet.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the Sheets API, e.g. `https://sheets.googleapis.com`
    /// * `sheet_id` - Spreadsheet identifier from the sheet's URL
    /// * `credentials` - Service account or bearer token with spreadsheet read/write scope
    ///
    /// # Errors
    /// * `StoreError::Connection` if the API cannot be reached or the sheet does not exist
    /// * `StoreError::Unauthorized` if the credentials are rejected
    pub fn connect(
        api_url: &str,
        sheet_id: &str,
        credentials: Credentials,
    ) -> Result<Self, StoreError> {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        let mut store = GoogleSheetStore {
            agent,
            api_url: api_url.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
            credentials,
            worksheet: String::new(),
        };

        let url = format!(
            "{}?fields=sheets.properties.title",
            store.spreadsheet_url()
        );
        let meta: SpreadsheetMeta = store
            .call("GET", &url, &[], None, Self::connection_error)?
            .into_json()
            .map_err(|e| StoreError::Connection {
                target: store.target(),
                reason: format!("unreadable metadata: {e}"),
            })?;

        let worksheet = meta
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .ok_or_else(|| StoreError::Connection {
                target: store.target(),
                reason: "spreadsheet has no worksheets".to_string(),
            })?;
        store.worksheet = worksheet;
        Ok(store)
    }

    /// Title of the worksheet holding the table.
    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    fn target(&self) -> String {
        format!("Google Sheet with ID {}", self.sheet_id)
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.api_url,
            urlencoding::encode(&self.sheet_id)
        )
    }

    /// A1 range covering the whole worksheet, quoted for titles with spaces.
    fn whole_sheet_range(&self) -> String {
        format!("'{}'", self.worksheet.replace('\'', "''"))
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(range)
        )
    }

    /// Send one authorized request.
    ///
    /// A 401 with refreshable credentials drops the cached token and retries
    /// once with a fresh one; every other failure goes through `on_error`.
    fn call(
        &self,
        method: &str,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        on_error: fn(&Self, ureq::Error) -> StoreError,
    ) -> Result<ureq::Response, StoreError> {
        let mut retried = false;
        loop {
            let token = self.credentials.bearer(&self.agent)?;
            let mut request = self
                .agent
                .request(method, url)
                .set("Authorization", &format!("Bearer {token}"));
            for (name, value) in query {
                request = request.query(name, value);
            }
            let result = match body {
                Some(body) => request.send_json(body),
                None => request.call(),
            };
            match result {
                Err(ureq::Error::Status(401, _)) if !retried && self.credentials.refreshable() => {
                    log::info!("access token for {} was rejected, refreshing", self.target());
                    self.credentials.invalidate();
                    retried = true;
                }
                Err(e) => return Err(on_error(self, e)),
                Ok(response) => return Ok(response),
            }
        }
    }

    fn connection_error(&self, err: ureq::Error) -> StoreError {
        match err {
            ureq::Error::Status(status @ (401 | 403), response) => StoreError::Unauthorized {
                target: self.target(),
                reason: format!("HTTP {status}: {}", error_message(response)),
            },
            ureq::Error::Status(status, response) => StoreError::Connection {
                target: self.target(),
                reason: format!("HTTP {status}: {}", error_message(response)),
            },
            ureq::Error::Transport(transport) => StoreError::Connection {
                target: self.target(),
                reason: transport.to_string(),
            },
        }
    }

    fn remote_error(&self, err: ureq::Error) -> StoreError {
        match err {
            ureq::Error::Status(status, response) if status != 401 && status != 403 => {
                StoreError::Remote {
                    status,
                    message: error_message(response),
                }
            }
            other => self.connection_error(other),
        }
    }
}

/// Pull the human readable message out of a Google API error body.
fn error_message(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    match response.into_json::<Value>() {
        Ok(body) => body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(status_text),
        Err(_) => status_text,
    }
}

/// Render a cell as the text the sheet displays.
fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetStore for GoogleSheetStore {
    fn load(&self) -> Result<MedicationTable, StoreError> {
        let url = self.values_url(&self.whole_sheet_range());
        let query = [
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "FORMATTED_VALUE"),
        ];
        let range: ValueRange = self
            .call("GET", &url, &query, None, Self::remote_error)?
            .into_json()?;

        let rows: Vec<Vec<String>> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        log::debug!("read {} rows from worksheet {:?}", rows.len(), self.worksheet);
        decode_rows(&rows)
    }

    fn save(&self, table: &MedicationTable) -> Result<(), StoreError> {
        let range = self.whole_sheet_range();
        let clear_url = format!("{}:clear", self.values_url(&range));
        self.call(
            "POST",
            &clear_url,
            &[],
            Some(&serde_json::json!({})),
            Self::remote_error,
        )?;

        let start = format!("{range}!A1");
        let rows = encode_rows(table);
        let body = serde_json::json!({
            "range": start,
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.call(
            "PUT",
            &self.values_url(&start),
            &[("valueInputOption", "RAW")],
            Some(&body),
            Self::remote_error,
        )?;
        log::debug!("wrote {} rows to worksheet {:?}", rows.len(), self.worksheet);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (worksheet {:?})", self.target(), self.worksheet)
    }
}
