use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Height used for BMI when no config override is present.
pub const DEFAULT_HEIGHT_M: f64 = 1.82;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Historical weigh-ins written into an empty store by `initialize`.
pub const SEED_MEASUREMENTS: &[(&str, f64)] = &[
    ("2024-11-06", 118.2),
    ("2024-11-13", 115.5),
    ("2024-11-19", 112.3),
    ("2024-11-27", 111.4),
    ("2024-12-04", 110.2),
    ("2024-12-11", 109.2),
    ("2024-12-18", 108.4),
    ("2024-12-25", 107.3),
    ("2025-01-01", 105.4),
    ("2025-01-08", 104.9),
    ("2025-01-15", 103.8),
];

/// One weigh-in. The date is the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub date: NaiveDate,
    pub weight: f64,
}

impl Measurement {
    #[must_use]
    pub fn new(date: NaiveDate, weight: f64) -> Self {
        Self { date, weight }
    }
}

/// A measurement with its derived BMI, ready for tables and charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub weight: f64,
    pub bmi: f64,
}

#[must_use]
pub fn bmi(weight_kg: f64, height_m: f64) -> f64 {
    weight_kg / (height_m * height_m)
}

/// Sort by date ascending and attach BMI. Duplicate dates are kept as given;
/// callers feeding from a store or session never produce them.
#[must_use]
pub fn derive_chart_series(measurements: &[Measurement], height_m: f64) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = measurements
        .iter()
        .map(|m| ChartPoint {
            date: m.date,
            weight: m.weight,
            bmi: bmi(m.weight, height_m),
        })
        .collect();
    points.sort_by_key(|p| p.date);
    points
}

#[must_use]
pub fn seed_measurements() -> Vec<Measurement> {
    SEED_MEASUREMENTS
        .iter()
        .filter_map(|(date, weight)| {
            NaiveDate::parse_from_str(date, DATE_FORMAT)
                .ok()
                .map(|d| Measurement::new(d, *weight))
        })
        .collect()
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Must be YYYY-MM-DD"))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn validate_height(height_m: f64) -> Result<()> {
    if !height_m.is_finite() || height_m <= 0.0 {
        bail!("Height must be a positive number of meters, got {height_m}");
    }
    Ok(())
}

pub fn validate_weight(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        bail!("Weight must be a positive number, got {weight_kg}");
    }
    Ok(())
}
