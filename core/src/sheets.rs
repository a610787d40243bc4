//! Google Sheets wire types and the conversions between sheet rows and
//! measurements. The HTTP client lives in the CLI crate.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{Measurement, format_date, parse_iso_date};

pub const DEFAULT_SHEET_NAME: &str = "Weight Tracker";
pub const HEADER: [&str; 2] = ["Date", "Weight"];

/// The fields of a Google service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(json).context("Malformed service account key")?;
        if key.client_email.trim().is_empty() {
            bail!("Service account key has an empty client_email");
        }
        if !key.private_key.contains("PRIVATE KEY") {
            bail!("Service account key has no PEM private_key");
        }
        Ok(key)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credential file: {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid credential file: {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SpreadsheetMeta {
    #[serde(default)]
    pub sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
pub struct SheetMeta {
    pub properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
pub struct SheetProperties {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// Turn a worksheet grid into header-keyed records, skipping fully blank rows.
#[must_use]
pub fn rows_to_records(values: &[Vec<Value>]) -> Vec<BTreeMap<String, Value>> {
    let Some((header, rows)) = values.split_first() else {
        return Vec::new();
    };
    let keys: Vec<String> = header.iter().map(cell_text).collect();
    rows.iter()
        .filter(|row| row.iter().any(|c| !cell_text(c).trim().is_empty()))
        .map(|row| {
            keys.iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                .collect()
        })
        .collect()
}

/// Read the `Date`/`Weight` columns of a worksheet grid.
pub fn measurements_from_values(values: &[Vec<Value>]) -> Result<Vec<Measurement>> {
    let mut out = Vec::new();
    for (i, record) in rows_to_records(values).iter().enumerate() {
        let row_no = i + 2;
        let date = record
            .get(HEADER[0])
            .map(cell_text)
            .with_context(|| format!("Row {row_no}: missing '{}' column", HEADER[0]))?;
        let date = parse_iso_date(&date).with_context(|| format!("Row {row_no}"))?;
        let weight = record
            .get(HEADER[1])
            .and_then(cell_number)
            .with_context(|| format!("Row {row_no}: '{}' is not a number", HEADER[1]))?;
        out.push(Measurement::new(date, weight));
    }
    Ok(out)
}

/// Header plus one row per measurement, in the order given. A date that
/// appears twice keeps its first position and its last weight.
#[must_use]
pub fn values_for_rewrite(measurements: &[Measurement]) -> Vec<Vec<Value>> {
    let mut rows: Vec<Measurement> = Vec::with_capacity(measurements.len());
    for m in measurements {
        match rows.iter_mut().find(|r| r.date == m.date) {
            Some(existing) => existing.weight = m.weight,
            None => rows.push(*m),
        }
    }
    let mut values = Vec::with_capacity(rows.len() + 1);
    values.push(HEADER.iter().map(|h| Value::from(*h)).collect());
    for m in rows {
        values.push(vec![Value::from(format_date(m.date)), Value::from(m.weight)]);
    }
    values
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
