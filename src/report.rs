//! Renders a `ReportSet` to an HTML or JSON file.

use crate::error::Result;
use crate::models::{ContactRecord, FilterMode, ReportSet, RunMetadata};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReportFormat {
    #[default]
    Html,
    Json,
}

impl ReportFormat {
    fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }
}

const MISSING_CELL: &str = r#"<span class="missing">N/A</span>"#;

const STYLE: &str = r#"
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }
        .container { max-width: 1200px; margin: 0 auto; background-color: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        h1 { color: #333; border-bottom: 3px solid #4CAF50; padding-bottom: 10px; }
        .search-info { background-color: #e8f5e9; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
        .search-info p { margin: 5px 0; color: #2e7d32; }
        table { width: 100%; border-collapse: collapse; margin-top: 20px; }
        th { background-color: #4CAF50; color: white; padding: 12px; text-align: left; font-weight: 600; }
        td { padding: 12px; border-bottom: 1px solid #ddd; vertical-align: top; }
        tr:hover { background-color: #f5f5f5; }
        .url { color: #1976d2; text-decoration: none; font-weight: bold; }
        .url:hover { text-decoration: underline; }
        .missing { color: #999; font-style: italic; }
        .stats { margin-top: 20px; padding: 15px; background-color: #f0f0f0; border-radius: 5px; }
"#;

/// Escapes text for use in HTML element content and double-quoted attributes.
pub(crate) fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn cell(value: Option<&str>) -> String {
    value.map(escape_html).unwrap_or_else(|| MISSING_CELL.to_string())
}

fn website_cell(record: &ContactRecord) -> String {
    let url = escape_html(&record.source_url);
    format!(r#"<a href="{url}" target="_blank" rel="noopener" class="url">{url}</a>"#)
}

fn columns(mode: FilterMode) -> &'static [&'static str] {
    match mode {
        FilterMode::Strict => &["Company", "Email", "Phone", "Address", "Website"],
        FilterMode::Relaxed => &["Website", "Email"],
    }
}

fn row_cells(record: &ContactRecord, mode: FilterMode) -> Vec<String> {
    match mode {
        FilterMode::Strict => vec![
            cell(record.company_name.as_deref()),
            cell(record.email.as_deref()),
            cell(record.phone.as_deref()),
            cell(record.address.as_deref()),
            website_cell(record),
        ],
        FilterMode::Relaxed => vec![website_cell(record), cell(record.email.as_deref())],
    }
}

/// Full HTML document for a report. Columns depend on the run's mode.
pub(crate) fn render_html(report: &ReportSet, meta: &RunMetadata) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Company Search Results</title>
    <style>{style}    </style>
</head>
<body>
    <div class="container">
        <h1>Company Search Results</h1>
        <div class="search-info">
            <p><strong>Keywords:</strong> {keyword}</p>
            <p><strong>Location:</strong> {location}</p>
            <p><strong>Mode:</strong> {mode}</p>
            <p><strong>Total Results:</strong> {count}</p>
        </div>
        <table>
            <thead>
                <tr>
"#,
        style = STYLE,
        keyword = escape_html(&meta.keyword),
        location = escape_html(&meta.location),
        mode = meta.mode,
        count = report.len(),
    );

    for column in columns(meta.mode) {
        let _ = writeln!(html, "                    <th>{}</th>", column);
    }
    html.push_str("                </tr>\n            </thead>\n            <tbody>\n");

    for record in report.iter() {
        html.push_str("                <tr>\n");
        for value in row_cells(record, meta.mode) {
            let _ = writeln!(html, "                    <td>{}</td>", value);
        }
        html.push_str("                </tr>\n");
    }

    let _ = write!(
        html,
        r#"            </tbody>
        </table>
        <div class="stats">
            <p><strong>Generated:</strong> {}</p>
        </div>
    </div>
</body>
</html>
"#,
        meta.generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    html
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    meta: &'a RunMetadata,
    total: usize,
    results: &'a ReportSet,
}

pub(crate) fn render_json(report: &ReportSet, meta: &RunMetadata) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonReport {
        meta,
        total: report.len(),
        results: report,
    })?)
}

/// `search_results_<unix-timestamp>.<ext>`
pub(crate) fn report_file_name(meta: &RunMetadata, format: ReportFormat) -> String {
    format!(
        "search_results_{}.{}",
        meta.generated_at.timestamp(),
        format.extension()
    )
}

/// Writes the report into `dir` and returns its path. Written even when the set is empty.
pub(crate) fn write_report(
    dir: &Path,
    format: ReportFormat,
    report: &ReportSet,
    meta: &RunMetadata,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report_file_name(meta, format));
    let content = match format {
        ReportFormat::Html => render_html(report, meta),
        ReportFormat::Json => render_json(report, meta)?,
    };
    fs::write(&path, content)?;
    tracing::info!("Wrote {} results to {}", report.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedupe::dedupe;

    fn sample_report() -> ReportSet {
        dedupe(vec![
            ContactRecord {
                company_name: Some("Smith & Sons <Law>".to_string()),
                email: Some("info@smith-law.com".to_string()),
                ..ContactRecord::new("https://smith-law.com/?a=1&b=2", "smith-law.com")
            },
            ContactRecord::new("https://quiet.com/", "quiet.com"),
        ])
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom's & Co</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom&#x27;s &amp; Co&lt;/a&gt;"
        );
    }

    #[test]
    fn test_strict_report_columns_and_escaping() {
        let meta = RunMetadata::new("law <firm>", "Springfield", FilterMode::Strict);
        let html = render_html(&sample_report(), &meta);
        for column in ["Company", "Email", "Phone", "Address", "Website"] {
            assert!(html.contains(&format!("<th>{}</th>", column)));
        }
        assert!(html.contains("law &lt;firm&gt;"));
        assert!(html.contains("Smith &amp; Sons &lt;Law&gt;"));
        assert!(html.contains("https://smith-law.com/?a=1&amp;b=2"));
        assert!(html.contains(MISSING_CELL));
        assert!(html.contains("<strong>Total Results:</strong> 2"));
    }

    #[test]
    fn test_relaxed_report_has_only_website_and_email() {
        let meta = RunMetadata::new("law", "Springfield", FilterMode::Relaxed);
        let html = render_html(&sample_report(), &meta);
        assert!(html.contains("<th>Website</th>"));
        assert!(html.contains("<th>Email</th>"));
        assert!(!html.contains("<th>Phone</th>"));
        assert!(!html.contains("<th>Company</th>"));
        assert!(!html.contains("Smith &amp; Sons"));
    }

    #[test]
    fn test_empty_report_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let meta = RunMetadata::new("nothing", "nowhere", FilterMode::Strict);
        let path = write_report(dir.path(), ReportFormat::Html, &ReportSet::new(), &meta).unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("search_results_"));
        assert!(name.ends_with(".html"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("<strong>Total Results:</strong> 0"));
        assert!(!content.contains("<td>"));
    }

    #[test]
    fn test_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let meta = RunMetadata::new("law", "Springfield", FilterMode::Relaxed);
        let path = write_report(dir.path(), ReportFormat::Json, &sample_report(), &meta).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("json"));

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["keyword"], "law");
        assert_eq!(value["mode"], "relaxed");
        assert_eq!(value["total"], 2);
        assert_eq!(value["results"][0]["domain"], "smith-law.com");
        assert!(value["results"][1].get("email").is_none());
    }
}
