//! In-memory working copy of the measurement series for one interactive
//! session, plus the record/edit/delete paths that write through to a store.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ChartPoint, Measurement, derive_chart_series, format_date};
use crate::store::MeasurementStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid input '{input}'. Please enter a numeric value.")]
    Parse { input: String },

    #[error("Could not load measurements from {store}: {source:#}")]
    StoreConnection {
        store: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Could not save the weight for {date} to {store}; the change was not kept: {source:#}")]
    StoreWrite {
        store: String,
        date: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Whether an edit or delete touched a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Missing,
}

pub struct Session<S> {
    store: S,
    height_m: f64,
    series: Option<BTreeMap<NaiveDate, f64>>,
    load_error: Option<String>,
}

impl<S: MeasurementStore> Session<S> {
    pub fn new(store: S, height_m: f64) -> Self {
        Self {
            store,
            height_m,
            series: None,
            load_error: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn height_m(&self) -> f64 {
        self.height_m
    }

    pub fn is_loaded(&self) -> bool {
        self.series.is_some()
    }

    /// Message from the last failed load, if the session is running on the
    /// empty fallback series.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Load the series on first use. A failed load leaves the session with an
    /// empty series and reports the error once; later calls reuse the cache.
    pub fn ensure_loaded(&mut self) -> Result<(), SessionError> {
        if self.series.is_some() {
            return Ok(());
        }
        self.reload()
    }

    /// Re-query the store and replace the cached series.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        match self.store.load_all() {
            Ok(rows) => {
                info!(rows = rows.len(), store = %self.store.describe(), "loaded measurements");
                self.series = Some(rows.into_iter().map(|m| (m.date, m.weight)).collect());
                self.load_error = None;
                Ok(())
            }
            Err(source) => {
                warn!(store = %self.store.describe(), "load failed, using empty series: {source:#}");
                self.series = Some(BTreeMap::new());
                let err = SessionError::StoreConnection {
                    store: self.store.describe(),
                    source,
                };
                self.load_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn series_mut(&mut self) -> &mut BTreeMap<NaiveDate, f64> {
        self.series.get_or_insert_with(BTreeMap::new)
    }

    /// The cached series in date order, loading it first if needed.
    pub fn series(&mut self) -> Vec<Measurement> {
        // A load failure is already recorded in `load_error`.
        let _ = self.ensure_loaded();
        self.series
            .as_ref()
            .map(|s| s.iter().map(|(d, w)| Measurement::new(*d, *w)).collect())
            .unwrap_or_default()
    }

    pub fn get(&mut self, date: NaiveDate) -> Option<f64> {
        let _ = self.ensure_loaded();
        self.series.as_ref().and_then(|s| s.get(&date).copied())
    }

    pub fn chart_series(&mut self) -> Vec<ChartPoint> {
        let height = self.height_m;
        derive_chart_series(&self.series(), height)
    }

    /// Record today's weight from raw user text. Blank input is skipped.
    pub fn record_today(&mut self, raw_input: &str) -> Result<Option<Measurement>, SessionError> {
        self.record_on(Local::now().date_naive(), raw_input)
    }

    pub fn record_on(
        &mut self,
        date: NaiveDate,
        raw_input: &str,
    ) -> Result<Option<Measurement>, SessionError> {
        let trimmed = raw_input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let weight = parse_weight(trimmed)?;
        let _ = self.ensure_loaded();

        let measurement = Measurement::new(date, weight);
        let previous = self.series_mut().insert(date, weight);
        if let Err(source) = self.store.upsert(&measurement) {
            self.restore(date, previous);
            return Err(self.write_error(date, source));
        }
        info!(date = %format_date(date), weight, "recorded weight");
        Ok(Some(measurement))
    }

    /// Edit-grid path: overwrite a stored row. A date the store does not know
    /// is left untouched everywhere.
    pub fn edit(&mut self, measurement: Measurement) -> Result<EditOutcome, SessionError> {
        let _ = self.ensure_loaded();
        let date = measurement.date;
        let previous = self.series_mut().insert(date, measurement.weight);
        match self.store.update(&measurement) {
            Ok(true) => {
                info!(date = %format_date(date), weight = measurement.weight, "updated weight");
                Ok(EditOutcome::Applied)
            }
            Ok(false) => {
                self.restore(date, previous);
                warn!(date = %format_date(date), "update skipped, no stored row for date");
                Ok(EditOutcome::Missing)
            }
            Err(source) => {
                self.restore(date, previous);
                Err(self.write_error(date, source))
            }
        }
    }

    pub fn delete(&mut self, date: NaiveDate) -> Result<EditOutcome, SessionError> {
        let _ = self.ensure_loaded();
        let previous = self.series_mut().remove(&date);
        match self.store.delete(date) {
            Ok(true) => {
                info!(date = %format_date(date), "deleted weight");
                Ok(EditOutcome::Applied)
            }
            Ok(false) => {
                self.restore(date, previous);
                Ok(EditOutcome::Missing)
            }
            Err(source) => {
                self.restore(date, previous);
                Err(self.write_error(date, source))
            }
        }
    }

    fn restore(&mut self, date: NaiveDate, previous: Option<f64>) {
        let series = self.series_mut();
        match previous {
            Some(w) => {
                series.insert(date, w);
            }
            None => {
                series.remove(&date);
            }
        }
    }

    fn write_error(&self, date: NaiveDate, source: anyhow::Error) -> SessionError {
        SessionError::StoreWrite {
            store: self.store.describe(),
            date: format_date(date),
            source,
        }
    }
}

/// Parse user text as a weight. Anything that is not a finite positive
/// number is rejected.
pub fn parse_weight(raw: &str) -> Result<f64, SessionError> {
    let parse_error = || SessionError::Parse {
        input: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| parse_error())?;
    if !value.is_finite() || value <= 0.0 {
        return Err(parse_error());
    }
    Ok(value)
}
