use std::fmt::Write;

use chrono::NaiveDate;
use tracing::error;

use weighin_core::models::{ChartPoint, format_date};

use crate::charts::{ChartKind, render_svg};
use crate::commands::NO_DATA_MESSAGE;

const STYLE: &str = "body{font-family:sans-serif;max-width:1060px;margin:0 auto;padding:1rem}\
nav a{margin-right:1rem}\
table{border-collapse:collapse;margin:1rem 0}\
td,th{border:1px solid #ccc;padding:.3rem .6rem}\
td.num{text-align:right}\
.success{background:#e6f4ea;padding:.6rem}\
.error{background:#fce8e6;padding:.6rem}\
.info{background:#e8f0fe;padding:.6rem}\
form.inline{display:inline}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
    Info(String),
}

impl Notice {
    fn class(&self) -> &'static str {
        match self {
            Notice::Success(_) => "success",
            Notice::Error(_) => "error",
            Notice::Info(_) => "info",
        }
    }

    fn text(&self) -> &str {
        match self {
            Notice::Success(s) | Notice::Error(s) | Notice::Info(s) => s,
        }
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, notices: &[Notice], body: &str) -> String {
    let mut html = format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title}</title><style>{STYLE}</style></head><body>\
         <nav><a href=\"/\">Tracker</a><a href=\"/edit\">Edit data</a></nav>",
        title = escape_html(title),
    );
    for notice in notices {
        let _ = write!(
            html,
            "<p class=\"{}\">{}</p>",
            notice.class(),
            escape_html(notice.text())
        );
    }
    html.push_str(body);
    html.push_str("</body></html>");
    html
}

fn series_table(points: &[ChartPoint]) -> String {
    let mut html =
        String::from("<table><thead><tr><th>Date</th><th>Weight (kg)</th><th>BMI</th></tr></thead><tbody>");
    for p in points {
        let _ = write!(
            html,
            "<tr><td>{}</td><td class=\"num\">{:.1}</td><td class=\"num\">{:.2}</td></tr>",
            format_date(p.date),
            p.weight,
            p.bmi
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// The tracker page: today's input, the data table and the three charts.
pub fn render_home(points: &[ChartPoint], today: NaiveDate, notices: &[Notice]) -> String {
    let mut body = format!(
        "<h1>Weight &amp; BMI Tracker</h1>\
         <p>Track weight and BMI over time and visualize progress.</p>\
         <form method=\"post\" action=\"/\">\
         <label>Weight for today ({today}) (leave blank to skip): \
         <input name=\"weight\" inputmode=\"decimal\" autocomplete=\"off\"></label> \
         <button type=\"submit\">Save</button></form>",
        today = format_date(today),
    );

    if points.is_empty() {
        let _ = write!(body, "<p class=\"info\">{NO_DATA_MESSAGE}</p>");
        return page("Weight & BMI Tracker", notices, &body);
    }

    body.push_str("<h2>Your Weight &amp; BMI Data</h2>");
    body.push_str(&series_table(points));

    for kind in ChartKind::ALL {
        let _ = write!(body, "<h2>{}</h2>", kind.heading());
        match render_svg(kind, points) {
            Ok(svg) => body.push_str(&svg),
            Err(e) => {
                error!("failed to render {:?} chart: {e:#}", kind);
                body.push_str("<p class=\"error\">Chart could not be rendered.</p>");
            }
        }
    }

    page("Weight & BMI Tracker", notices, &body)
}

/// The edit grid: one form per row to overwrite or delete it.
pub fn render_edit(points: &[ChartPoint], notices: &[Notice]) -> String {
    let mut body = String::from("<h1>Edit Weight Data</h1>");

    if points.is_empty() {
        let _ = write!(body, "<p class=\"info\">{NO_DATA_MESSAGE}</p>");
        return page("Edit Weight Data", notices, &body);
    }

    body.push_str("<table><thead><tr><th>Date</th><th>Weight (kg)</th><th></th></tr></thead><tbody>");
    for p in points {
        let date = format_date(p.date);
        let _ = write!(
            body,
            "<tr><td>{date}</td><td>\
             <form class=\"inline\" method=\"post\" action=\"/edit\">\
             <input type=\"hidden\" name=\"date\" value=\"{date}\">\
             <input name=\"weight\" value=\"{weight}\" inputmode=\"decimal\"> \
             <button type=\"submit\">Save</button></form></td><td>\
             <form class=\"inline\" method=\"post\" action=\"/delete\">\
             <input type=\"hidden\" name=\"date\" value=\"{date}\">\
             <button type=\"submit\">Delete</button></form></td></tr>",
            weight = p.weight,
        );
    }
    body.push_str("</tbody></table>");

    page("Edit Weight Data", notices, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weighin_core::models::{derive_chart_series, seed_measurements};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>\"x\" & 'y'</script>"),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_home_without_data_shows_placeholder() {
        let html = render_home(&[], today(), &[]);
        assert!(html.contains(NO_DATA_MESSAGE));
        assert!(!html.contains("<svg"));
        assert!(html.contains("2025-01-20"));
    }

    #[test]
    fn test_home_with_data_has_table_and_three_charts() {
        let points = derive_chart_series(&seed_measurements(), 1.82);
        let html = render_home(&points, today(), &[]);
        assert!(html.contains("<td>2024-11-06</td>"));
        assert!(html.contains("35.68"));
        assert_eq!(html.matches("<svg").count(), 3);
        for kind in ChartKind::ALL {
            assert!(html.contains(kind.heading()));
        }
    }

    #[test]
    fn test_notices_are_escaped() {
        let notices = [Notice::Error("Invalid input '<b>'".to_string())];
        let html = render_home(&[], today(), &notices);
        assert!(html.contains("class=\"error\""));
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_edit_page_has_row_forms() {
        let points = derive_chart_series(&seed_measurements(), 1.82);
        let html = render_edit(&points, &[Notice::Success("Changes saved!".to_string())]);
        assert_eq!(html.matches("action=\"/edit\"").count(), 11);
        assert_eq!(html.matches("action=\"/delete\"").count(), 11);
        assert!(html.contains("value=\"118.2\""));
        assert!(html.contains("Changes saved!"));
    }
}
