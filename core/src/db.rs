use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};

use crate::models::{DATE_FORMAT, Measurement, format_date};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS weight_data (
                    date TEXT PRIMARY KEY NOT NULL,
                    weight REAL NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    fn measurement_from_row(row: &rusqlite::Row) -> rusqlite::Result<Measurement> {
        let date_str: String = row.get(0)?;
        let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Measurement {
            date,
            weight: row.get(1)?,
        })
    }

    pub fn count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM weight_data", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Insert every row whose date is not present yet. Returns rows written.
    pub fn insert_missing(&mut self, measurements: &[Measurement]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weight_data (date, weight) VALUES (?1, ?2)
                 ON CONFLICT(date) DO NOTHING",
            )?;
            for m in measurements {
                inserted += stmt.execute(params![format_date(m.date), m.weight])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Seed an empty table. A non-empty table is left alone.
    pub fn seed_if_empty(&mut self, seed: &[Measurement]) -> Result<usize> {
        if self.count()? > 0 {
            return Ok(0);
        }
        self.insert_missing(seed)
    }

    pub fn load_all(&self) -> Result<Vec<Measurement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, weight FROM weight_data ORDER BY date")?;
        let rows = stmt
            .query_map([], Self::measurement_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<Measurement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, weight FROM weight_data WHERE date = ?1")?;
        let mut rows = stmt.query(params![format_date(date)])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::measurement_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn upsert(&self, m: &Measurement) -> Result<()> {
        self.conn.execute(
            "INSERT INTO weight_data (date, weight) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET weight = excluded.weight",
            params![format_date(m.date), m.weight],
        )?;
        Ok(())
    }

    /// Overwrite an existing row. Returns false when no row has that date.
    pub fn update(&self, m: &Measurement) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE weight_data SET weight = ?1 WHERE date = ?2",
            params![m.weight, format_date(m.date)],
        )?;
        Ok(rows > 0)
    }

    pub fn delete(&self, date: NaiveDate) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM weight_data WHERE date = ?1",
            params![format_date(date)],
        )?;
        Ok(rows > 0)
    }
}
