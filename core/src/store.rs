use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::db::Database;
use crate::models::{Measurement, seed_measurements};

/// Durable date-keyed weight storage.
///
/// The local SQLite file and the remote spreadsheet both implement this, and
/// the session logic only ever talks to the trait. Every call is a single
/// attempt; failures go straight back to the caller.
pub trait MeasurementStore: Send {
    /// Make sure the backing table or sheet exists and seed it when empty.
    /// Returns the number of seed rows written.
    fn initialize(&self) -> Result<usize>;

    fn load_all(&self) -> Result<Vec<Measurement>>;

    /// Insert or overwrite the weight for `m.date`.
    fn upsert(&self, m: &Measurement) -> Result<()>;

    /// Overwrite an existing row. Returns false (and writes nothing) when the
    /// date is not stored.
    fn update(&self, m: &Measurement) -> Result<bool>;

    fn delete(&self, date: NaiveDate) -> Result<bool>;

    /// Short human-readable location, used in log lines and error messages.
    fn describe(&self) -> String;
}

impl<S: MeasurementStore + ?Sized> MeasurementStore for Box<S> {
    fn initialize(&self) -> Result<usize> {
        (**self).initialize()
    }

    fn load_all(&self) -> Result<Vec<Measurement>> {
        (**self).load_all()
    }

    fn upsert(&self, m: &Measurement) -> Result<()> {
        (**self).upsert(m)
    }

    fn update(&self, m: &Measurement) -> Result<bool> {
        (**self).update(m)
    }

    fn delete(&self, date: NaiveDate) -> Result<bool> {
        (**self).delete(date)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// SQLite-backed store that opens a fresh connection for every operation.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Database> {
        debug!(path = %self.path.display(), "opening weight database");
        Database::open(&self.path)
    }
}

impl MeasurementStore for SqliteStore {
    fn initialize(&self) -> Result<usize> {
        let mut db = self.connect()?;
        let seeded = db.seed_if_empty(&seed_measurements())?;
        if seeded > 0 {
            info!(rows = seeded, path = %self.path.display(), "seeded weight database");
        }
        Ok(seeded)
    }

    fn load_all(&self) -> Result<Vec<Measurement>> {
        self.connect()?.load_all()
    }

    fn upsert(&self, m: &Measurement) -> Result<()> {
        self.connect()?.upsert(m)
    }

    fn update(&self, m: &Measurement) -> Result<bool> {
        self.connect()?.update(m)
    }

    fn delete(&self, date: NaiveDate) -> Result<bool> {
        self.connect()?.delete(date)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
