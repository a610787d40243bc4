use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::Deserialize;

use weighin_core::models::{DEFAULT_HEIGHT_M, validate_height};
use weighin_core::sheets::DEFAULT_SHEET_NAME;

const CONFIG_FILE: &str = "config.json";
const DEFAULT_DB_FILE: &str = "weight_tracker.db";
const DEFAULT_CREDENTIALS_FILE: &str = "service_account.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Sheets,
}

/// On-disk overrides. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    height_m: Option<f64>,
    backend: Option<Backend>,
    db_file: Option<PathBuf>,
    sheet_name: Option<String>,
    credentials: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub height_m: f64,
    pub backend: Backend,
    pub sheet_name: String,
    pub credentials_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "weighin").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Self::load_from(&data_dir)
    }

    /// Build the config for `data_dir`, applying `config.json` when present.
    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let file = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str::<FileConfig>(&text)
                .with_context(|| format!("Malformed config file: {}", path.display()))?
        } else {
            FileConfig::default()
        };

        let height_m = file.height_m.unwrap_or(DEFAULT_HEIGHT_M);
        validate_height(height_m).with_context(|| format!("In {}", path.display()))?;

        let sheet_name = file
            .sheet_name
            .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string());
        if sheet_name.trim().is_empty() {
            bail!("sheet_name in {} must not be empty", path.display());
        }

        Ok(Config {
            db_path: resolve(data_dir, file.db_file, DEFAULT_DB_FILE),
            credentials_path: resolve(data_dir, file.credentials, DEFAULT_CREDENTIALS_FILE),
            height_m,
            backend: file.backend.unwrap_or(Backend::Sqlite),
            sheet_name,
        })
    }
}

/// Relative paths in the config file are relative to the data directory.
fn resolve(data_dir: &Path, configured: Option<PathBuf>, default: &str) -> PathBuf {
    match configured {
        Some(p) if p.is_absolute() => p,
        Some(p) => data_dir.join(p),
        None => data_dir.join(default),
    }
}
