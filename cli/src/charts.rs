use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};
use plotters::prelude::*;

use weighin_core::models::ChartPoint;

const CHART_SIZE: (u32, u32) = (1000, 600);
const WEIGHT_COLOR: RGBColor = RGBColor(31, 119, 180);
const BMI_COLOR: RGBColor = RGBColor(255, 165, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Weight,
    Bmi,
    Combined,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Weight, ChartKind::Bmi, ChartKind::Combined];

    pub fn title(self) -> &'static str {
        match self {
            ChartKind::Weight => "Weight Over Time",
            ChartKind::Bmi => "BMI Over Time",
            ChartKind::Combined => "Weight and BMI Over Time",
        }
    }

    pub fn heading(self) -> &'static str {
        match self {
            ChartKind::Weight => "Weight Progress Chart",
            ChartKind::Bmi => "BMI Progress Chart",
            ChartKind::Combined => "Weight and BMI Combined Chart",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ChartKind::Weight => "weight.svg",
            ChartKind::Bmi => "bmi.svg",
            ChartKind::Combined => "combined.svg",
        }
    }

    fn y_label(self) -> &'static str {
        match self {
            ChartKind::Weight => "Weight (kg)",
            ChartKind::Bmi => "BMI",
            ChartKind::Combined => "",
        }
    }
}

struct Line {
    label: &'static str,
    color: RGBColor,
    dashed: bool,
    values: Vec<(NaiveDate, f64)>,
}

fn lines_for(kind: ChartKind, points: &[ChartPoint]) -> Vec<Line> {
    let weight = || Line {
        label: "Weight (kg)",
        color: WEIGHT_COLOR,
        dashed: false,
        values: points.iter().map(|p| (p.date, p.weight)).collect(),
    };
    let bmi = |dashed| Line {
        label: "BMI",
        color: BMI_COLOR,
        dashed,
        values: points.iter().map(|p| (p.date, p.bmi)).collect(),
    };
    match kind {
        ChartKind::Weight => vec![weight()],
        ChartKind::Bmi => vec![bmi(false)],
        ChartKind::Combined => vec![weight(), bmi(true)],
    }
}

/// Render one chart as an SVG document. `points` must be sorted by date and
/// non-empty.
pub fn render_svg(kind: ChartKind, points: &[ChartPoint]) -> Result<String> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        bail!("No data to chart");
    };
    let lines = lines_for(kind, points);

    let (mut y_min, mut y_max) = lines
        .iter()
        .flat_map(|l| l.values.iter().map(|(_, v)| *v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let pad = ((y_max - y_min) * 0.1).max(1.0);
    y_min -= pad;
    y_max += pad;
    let x_range = (first.date - Duration::days(1))..(last.date + Duration::days(1));

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(kind.title(), ("sans-serif", 28))
            .margin(20)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 50)
            .build_cartesian_2d(x_range, y_min..y_max)?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc(kind.y_label())
            .x_labels(8)
            .x_label_formatter(&|d| d.format("%Y-%m-%d").to_string())
            .y_label_formatter(&|v| format!("{v:.1}"))
            .draw()?;

        for line in &lines {
            let color = line.color;
            let points = line.values.iter().copied();
            let series = if line.dashed {
                chart.draw_series(DashedLineSeries::new(
                    points,
                    8,
                    5,
                    color.stroke_width(2),
                ))?
            } else {
                chart.draw_series(LineSeries::new(points, color.stroke_width(2)))?
            };
            series
                .label(line.label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            chart.draw_series(
                line.values
                    .iter()
                    .map(|&(d, v)| Circle::new((d, v), 4, color.filled())),
            )?;
        }

        if kind == ChartKind::Combined {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .position(SeriesLabelPosition::UpperRight)
                .draw()?;
        }

        root.present()?;
    }
    Ok(svg)
}
