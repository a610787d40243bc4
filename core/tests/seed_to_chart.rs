use chrono::NaiveDate;
use weighin_core::models::{DEFAULT_HEIGHT_M, SEED_MEASUREMENTS, derive_chart_series, format_date};
use weighin_core::session::Session;
use weighin_core::store::{MeasurementStore, SqliteStore};

#[test]
fn seeded_store_loads_all_sample_rows_and_derives_bmi() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("weight_tracker.db"));
    assert_eq!(store.initialize().unwrap(), SEED_MEASUREMENTS.len());

    let loaded = store.load_all().unwrap();
    let pairs: Vec<(String, f64)> = loaded
        .iter()
        .map(|m| (format_date(m.date), m.weight))
        .collect();
    let expected: Vec<(String, f64)> = SEED_MEASUREMENTS
        .iter()
        .map(|(d, w)| ((*d).to_string(), *w))
        .collect();
    assert_eq!(pairs, expected);

    let series = derive_chart_series(&loaded, 1.82);
    let first = series.first().unwrap();
    let last = series.last().unwrap();
    assert_eq!(format_date(first.date), "2024-11-06");
    assert!((first.bmi - 35.68).abs() < 0.01);
    assert_eq!(format_date(last.date), "2025-01-15");
    assert!((last.bmi - 31.33).abs() < 0.01);
}

#[test]
fn empty_store_gives_empty_chart_series() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("empty.db"));
    let mut session = Session::new(store, DEFAULT_HEIGHT_M);

    session.ensure_loaded().unwrap();
    assert!(session.chart_series().is_empty());
    assert!(session.load_error().is_none());
}

#[test]
fn session_writes_survive_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weight_tracker.db");
    let d = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();

    let mut first = Session::new(SqliteStore::new(&path), DEFAULT_HEIGHT_M);
    first.store().initialize().unwrap();
    first.record_on(d, "102.7").unwrap();

    let mut second = Session::new(SqliteStore::new(&path), DEFAULT_HEIGHT_M);
    assert_eq!(second.get(d), Some(102.7));
    assert_eq!(second.series().len(), 12);
}
