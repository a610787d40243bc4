use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use weighin_core::models::{Measurement, seed_measurements};
use weighin_core::sheets::{
    DriveFileList, ServiceAccountKey, SpreadsheetMeta, TokenResponse, ValueRange,
    measurements_from_values, values_for_rewrite,
};
use weighin_core::store::MeasurementStore;

const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// An authenticated handle on the first worksheet of the named spreadsheet.
struct Worksheet {
    token: String,
    spreadsheet_id: String,
    range: String,
}

/// Measurement store backed by a Google spreadsheet.
///
/// Each operation authenticates and opens the sheet from scratch. Writes
/// clear the worksheet and append the header plus every row, so a write
/// costs O(rows) and is not atomic: a failure between the clear and the
/// append leaves the sheet empty.
pub struct SheetsStore {
    client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    sheet_name: String,
    rt: tokio::runtime::Handle,
}

impl SheetsStore {
    pub fn new(
        credentials: &Path,
        sheet_name: &str,
        rt: tokio::runtime::Handle,
    ) -> Result<Self> {
        let key = ServiceAccountKey::from_file(credentials)?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .with_context(|| {
                format!(
                    "Credential file {} has an unusable private_key",
                    credentials.display()
                )
            })?;
        let client = reqwest::Client::builder()
            .user_agent(format!("weighin/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            key,
            encoding_key,
            sheet_name: sheet_name.to_string(),
            rt,
        })
    }

    fn signed_assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before 1970")?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .context("Failed to sign service account assertion")
    }

    async fn access_token(&self) -> Result<String> {
        let assertion = self.signed_assertion()?;
        let resp: TokenResponse = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to reach Google token endpoint")?
            .error_for_status()
            .context("Google rejected the service account credentials")?
            .json()
            .await
            .context("Failed to parse token response")?;
        Ok(resp.access_token)
    }

    async fn open(&self) -> Result<Worksheet> {
        let token = self.access_token().await?;

        let files: DriveFileList = self
            .client
            .get(DRIVE_FILES_URL)
            .bearer_auth(&token)
            .query(&[
                ("q", drive_query(&self.sheet_name).as_str()),
                ("fields", "files(id,name)"),
            ])
            .send()
            .await
            .context("Failed to reach Google Drive API")?
            .error_for_status()
            .context("Google Drive lookup failed")?
            .json()
            .await
            .context("Failed to parse Google Drive response")?;
        let Some(file) = files.files.into_iter().next() else {
            bail!(
                "No spreadsheet named '{}' is shared with {}",
                self.sheet_name,
                self.key.client_email
            );
        };
        debug!(id = %file.id, name = %file.name, "opened spreadsheet");

        let meta: SpreadsheetMeta = self
            .client
            .get(spreadsheet_url(&file.id, &[])?)
            .bearer_auth(&token)
            .query(&[("fields", "sheets.properties.title")])
            .send()
            .await
            .context("Failed to reach Google Sheets API")?
            .error_for_status()
            .context("Spreadsheet metadata request failed")?
            .json()
            .await
            .context("Failed to parse spreadsheet metadata")?;
        let title = meta
            .sheets
            .into_iter()
            .next()
            .map(|s| s.properties.title)
            .with_context(|| format!("Spreadsheet '{}' has no worksheets", self.sheet_name))?;

        Ok(Worksheet {
            token,
            spreadsheet_id: file.id,
            range: quote_sheet_title(&title),
        })
    }

    async fn read(&self, ws: &Worksheet) -> Result<Vec<Vec<Value>>> {
        let url = spreadsheet_url(&ws.spreadsheet_id, &["values", &ws.range])?;
        let range: ValueRange = self
            .client
            .get(url)
            .bearer_auth(&ws.token)
            .query(&[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "FORMATTED_STRING"),
            ])
            .send()
            .await
            .context("Failed to read worksheet")?
            .error_for_status()
            .context("Worksheet read failed")?
            .json()
            .await
            .context("Failed to parse worksheet values")?;
        Ok(range.values)
    }

    async fn load(&self, ws: &Worksheet) -> Result<Vec<Measurement>> {
        let values = self.read(ws).await?;
        measurements_from_values(&values)
            .with_context(|| format!("Spreadsheet '{}' has malformed rows", self.sheet_name))
    }

    /// Clear the worksheet, then append the header and all rows.
    async fn rewrite(&self, ws: &Worksheet, measurements: &[Measurement]) -> Result<()> {
        let clear_url =
            spreadsheet_url(&ws.spreadsheet_id, &["values", &format!("{}:clear", ws.range)])?;
        self.client
            .post(clear_url)
            .bearer_auth(&ws.token)
            .json(&json!({}))
            .send()
            .await
            .context("Failed to clear worksheet")?
            .error_for_status()
            .context("Worksheet clear failed")?;

        let append_url =
            spreadsheet_url(&ws.spreadsheet_id, &["values", &format!("{}:append", ws.range)])?;
        let result = self
            .client
            .post(append_url)
            .bearer_auth(&ws.token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": values_for_rewrite(measurements) }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            warn!(sheet = %self.sheet_name, "worksheet was cleared but rows were not re-appended");
            return Err(e).context("Failed to append rows after clearing worksheet");
        }
        info!(rows = measurements.len(), sheet = %self.sheet_name, "rewrote worksheet");
        Ok(())
    }

    async fn modify<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<Measurement>) -> bool,
    {
        let ws = self.open().await?;
        let mut rows = self.load(&ws).await?;
        if !change(&mut rows) {
            return Ok(false);
        }
        self.rewrite(&ws, &rows).await?;
        Ok(true)
    }
}

impl MeasurementStore for SheetsStore {
    fn initialize(&self) -> Result<usize> {
        self.rt.block_on(async {
            let ws = self.open().await?;
            if !self.load(&ws).await?.is_empty() {
                return Ok(0);
            }
            let seed = seed_measurements();
            self.rewrite(&ws, &seed).await?;
            Ok(seed.len())
        })
    }

    fn load_all(&self) -> Result<Vec<Measurement>> {
        self.rt.block_on(async {
            let ws = self.open().await?;
            self.load(&ws).await
        })
    }

    fn upsert(&self, m: &Measurement) -> Result<()> {
        self.rt
            .block_on(self.modify(|rows| {
                upsert_row(rows, *m);
                true
            }))
            .map(|_| ())
    }

    fn update(&self, m: &Measurement) -> Result<bool> {
        self.rt.block_on(self.modify(|rows| {
            if rows.iter().any(|r| r.date == m.date) {
                upsert_row(rows, *m);
                true
            } else {
                false
            }
        }))
    }

    fn delete(&self, date: NaiveDate) -> Result<bool> {
        self.rt.block_on(self.modify(|rows| {
            let before = rows.len();
            rows.retain(|r| r.date != date);
            rows.len() != before
        }))
    }

    fn describe(&self) -> String {
        format!("sheets:{}", self.sheet_name)
    }
}

/// Overwrite the row for `m.date` where it sits, or append a new row.
fn upsert_row(rows: &mut Vec<Measurement>, m: Measurement) {
    match rows.iter_mut().find(|r| r.date == m.date) {
        Some(existing) => existing.weight = m.weight,
        None => rows.push(m),
    }
}

fn drive_query(sheet_name: &str) -> String {
    let escaped = sheet_name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{escaped}' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false"
    )
}

/// A1 notation for a whole worksheet.
fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

fn spreadsheet_url(spreadsheet_id: &str, tail: &[&str]) -> Result<Url> {
    let mut url = Url::parse(SHEETS_URL).context("invalid Sheets base URL")?;
    url.path_segments_mut()
        .map_err(|()| anyhow::anyhow!("Sheets base URL cannot take path segments"))?
        .push(spreadsheet_id)
        .extend(tail);
    Ok(url)
}
