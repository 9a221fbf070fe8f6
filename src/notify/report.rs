//! Report building and HTML rendering.

use chrono::NaiveDateTime;

use crate::models::{Changes, Observations};
use crate::utils::site_label;

/// One table row: a monitored URL and its date transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub site: String,
    pub url: String,
    /// Prior date, or `N/A` when the URL has no prior observation
    pub old_date: String,
    pub new_date: String,
    pub changed: bool,
}

/// Summary of one run, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub generated_at: NaiveDateTime,
    pub total: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn build(
        changes: &Changes,
        current: &Observations,
        previous: &Observations,
        generated_at: NaiveDateTime,
    ) -> Self {
        let rows: Vec<ReportRow> = current
            .iter()
            .map(|(url, obs)| {
                let change = changes.get(url);
                let old_date = match change {
                    Some(change) => change.old.clone(),
                    None => previous
                        .get(url)
                        .map(|prev| prev.date.clone())
                        .unwrap_or_else(|| "N/A".to_string()),
                };
                ReportRow {
                    site: site_label(url),
                    url: url.clone(),
                    old_date,
                    new_date: obs.date.clone(),
                    changed: change.is_some(),
                }
            })
            .collect();

        let total = current.len();
        let changed = rows.iter().filter(|row| row.changed).count();

        Self {
            generated_at,
            total,
            changed,
            unchanged: total - changed,
            rows,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.changed > 0
    }

    /// Email subject line, dated by the run.
    pub fn subject(&self) -> String {
        let date = self.generated_at.format("%Y-%m-%d");
        if self.has_changes() {
            format!("⚠️ Product Date Changes Detected - {date}")
        } else {
            format!("✓ Product Date Check - No Changes - {date}")
        }
    }

    /// Render the report as a self-contained HTML document.
    pub fn render_html(&self) -> String {
        let mut summary = String::new();
        if self.has_changes() {
            summary.push_str(&format!(
                r#"<strong style="color: #4CAF50;">⚠️ {} product(s) changed</strong> | "#,
                self.changed
            ));
        }
        summary.push_str(&format!(
            r#"<strong style="color: #2196F3;">{} product(s) unchanged</strong> | <strong>Total: {} products monitored</strong>"#,
            self.unchanged, self.total
        ));

        let rows: String = self.rows.iter().map(render_row).collect();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>{style}</style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>📊 Product Date Checker Report</h1>
            <p>Generated on {generated}</p>
        </div>
        <div class="content">
            <div class="summary">{summary}</div>
            <div class="table-wrapper">
                <table>
                    <thead>
                        <tr>
                            <th class="site-cell">Site</th>
                            <th class="product-link">Product Link</th>
                            <th>Old Date</th>
                            <th>Current Date</th>
                            <th class="status-cell">Status</th>
                        </tr>
                    </thead>
                    <tbody>{rows}
                    </tbody>
                </table>
            </div>
        </div>
        <div class="footer">
            <p>This is an automated report from the Product Date Checker.</p>
        </div>
    </div>
</body>
</html>
"#,
            style = STYLE,
            generated = self.generated_at.format("%B %-d, %Y at %-I:%M %p"),
            summary = summary,
            rows = rows,
        )
    }
}

fn render_row(row: &ReportRow) -> String {
    let status = if row.changed {
        r#"<span class="status-changed" title="Date Changed">✓</span>"#
    } else {
        r#"<span class="status-unchanged" title="No Change">✗</span>"#
    };
    let url = escape_html(&row.url);
    format!(
        r#"
                        <tr>
                            <td class="site-cell">{site}</td>
                            <td class="product-link"><a href="{url}" target="_blank">{url}</a></td>
                            <td class="date-cell old-date">{old}</td>
                            <td class="date-cell new-date">{new}</td>
                            <td class="status-cell">{status}</td>
                        </tr>"#,
        site = escape_html(&row.site),
        url = url,
        old = escape_html(&row.old_date),
        new = escape_html(&row.new_date),
        status = status,
    )
}

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; }
        .container { max-width: 1000px; margin: 0 auto; padding: 20px; }
        .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px 20px; border-radius: 10px; text-align: center; }
        .header h1 { margin: 0 0 10px 0; font-size: 28px; }
        .header p { margin: 0; font-size: 14px; opacity: 0.9; }
        .content { background: #f9f9f9; padding: 20px; margin-top: 20px; border-radius: 10px; }
        .summary { background: white; padding: 15px; margin-bottom: 20px; border-radius: 8px; border-left: 4px solid #667eea; }
        .table-wrapper { overflow-x: auto; -webkit-overflow-scrolling: touch; }
        table { width: 100%; border-collapse: collapse; background: white; border-radius: 8px; overflow: hidden; }
        thead { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; }
        th { padding: 15px 10px; text-align: left; font-weight: 600; font-size: 14px; }
        td { padding: 15px 10px; border-bottom: 1px solid #e0e0e0; font-size: 13px; }
        .site-cell { width: 120px; font-weight: 600; color: #667eea; }
        .product-link { max-width: 250px; word-break: break-word; }
        .product-link a { color: #667eea; text-decoration: none; font-weight: 500; }
        .date-cell { font-family: "Courier New", monospace; font-weight: 600; white-space: nowrap; }
        .old-date { color: #999; }
        .status-cell { text-align: center; width: 100px; }
        .status-changed { color: #4CAF50; font-size: 24px; }
        .status-unchanged { color: #f44336; font-size: 24px; }
        .footer { margin-top: 20px; padding-top: 20px; border-top: 1px solid #ddd; color: #666; font-size: 12px; text-align: center; }
        @media only screen and (max-width: 768px) {
            .container { padding: 10px !important; }
            th, td { padding: 8px 4px !important; font-size: 11px !important; }
            .site-cell { width: 80px !important; font-size: 10px !important; }
            .product-link { max-width: 120px !important; word-break: break-all !important; }
            .status-cell { width: 40px !important; }
        }
    "#;
