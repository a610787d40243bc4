use std::path::Path;

use anyhow::{Context, Result};

use weighin_core::session::Session;
use weighin_core::store::MeasurementStore;

use super::helpers::NO_DATA_MESSAGE;
use crate::charts::{ChartKind, render_svg};

pub(crate) fn cmd_chart<S: MeasurementStore>(
    session: &mut Session<S>,
    out_dir: &Path,
    json: bool,
) -> Result<()> {
    if let Err(e) = session.ensure_loaded() {
        eprintln!("Failed to load data: {e}");
    }

    let points = session.chart_series();
    if points.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "written": [] }));
        } else {
            eprintln!("{NO_DATA_MESSAGE}");
        }
        return Ok(());
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut written = Vec::new();
    for kind in ChartKind::ALL {
        let svg = render_svg(kind, &points)?;
        let path = out_dir.join(kind.file_name());
        std::fs::write(&path, svg)
            .with_context(|| format!("Failed to write chart: {}", path.display()))?;
        written.push(path);
    }

    if json {
        println!("{}", serde_json::json!({ "written": written }));
    } else {
        for path in &written {
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weighin_core::models::DEFAULT_HEIGHT_M;
    use weighin_core::store::SqliteStore;

    #[test]
    fn test_chart_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("w.db"));
        store.initialize().unwrap();
        let mut session = Session::new(store, DEFAULT_HEIGHT_M);

        let out = dir.path().join("charts");
        cmd_chart(&mut session, &out, false).unwrap();
        for kind in ChartKind::ALL {
            assert!(out.join(kind.file_name()).exists());
        }
    }

    #[test]
    fn test_chart_with_no_data_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(SqliteStore::new(dir.path().join("w.db")), DEFAULT_HEIGHT_M);

        let out = dir.path().join("charts");
        cmd_chart(&mut session, &out, false).unwrap();
        assert!(!out.exists());
    }
}
