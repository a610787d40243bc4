use anyhow::{Result, bail};

use weighin_core::models::{Measurement, bmi, format_date, parse_iso_date};
use weighin_core::session::{EditOutcome, Session, SessionError, parse_weight};
use weighin_core::store::MeasurementStore;

use super::helpers::{NO_DATA_MESSAGE, json_error, parse_date, print_series_table};

pub(crate) fn cmd_log<S: MeasurementStore>(
    session: &mut Session<S>,
    value: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;

    match session.record_on(date, value) {
        Ok(Some(m)) => {
            let bmi = bmi(m.weight, session.height_m());
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "date": m.date, "weight": m.weight, "bmi": bmi })
                );
            } else {
                println!(
                    "Logged {:.1} kg for {} (BMI {bmi:.2})",
                    m.weight,
                    format_date(m.date)
                );
            }
            Ok(())
        }
        Ok(None) => {
            eprintln!("No weight entered; nothing saved.");
            Ok(())
        }
        Err(e @ SessionError::Parse { .. }) if json => {
            println!("{}", json_error(&e.to_string()));
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn cmd_show<S: MeasurementStore>(
    session: &mut Session<S>,
    days: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Err(e) = session.ensure_loaded() {
        eprintln!("Failed to load data: {e}");
    }

    let mut points = session.chart_series();
    if let Some(n) = days {
        let skip = points.len().saturating_sub(n);
        points.drain(..skip);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else if points.is_empty() {
        eprintln!("{NO_DATA_MESSAGE}");
    } else {
        print_series_table(&points);
    }

    Ok(())
}

pub(crate) fn cmd_edit<S: MeasurementStore>(
    session: &mut Session<S>,
    date: &str,
    weight: &str,
    json: bool,
) -> Result<()> {
    let date = parse_iso_date(date)?;
    let weight = parse_weight(weight)?;

    let outcome = session.edit(Measurement::new(date, weight))?;
    let date_str = format_date(date);
    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date_str, "weight": weight, "updated": outcome == EditOutcome::Applied })
        );
    } else if outcome == EditOutcome::Applied {
        println!("Updated {date_str} to {weight:.1} kg");
    } else {
        bail!("No weight entry for {date_str}; use `weighin log --date {date_str}` to add one");
    }

    Ok(())
}

pub(crate) fn cmd_delete<S: MeasurementStore>(
    session: &mut Session<S>,
    date: &str,
    json: bool,
) -> Result<()> {
    let date = parse_iso_date(date)?;
    let outcome = session.delete(date)?;
    let date_str = format_date(date);

    if json {
        println!(
            "{}",
            serde_json::json!({ "deleted": outcome == EditOutcome::Applied, "date": date_str })
        );
    } else if outcome == EditOutcome::Applied {
        println!("Deleted weight entry for {date_str}");
    } else {
        bail!("No weight entry for {date_str}");
    }

    Ok(())
}
