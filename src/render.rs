//! HTML and JSON renderings of the aggregated records.

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

use crate::error::RenderError;
use crate::normalize::kb_placeholder_display;
use crate::record::{UpdateRecord, KB_PLACEHOLDER};

pub const EMPTY_MESSAGE: &str = "No updates found.";
const COLUMNS: usize = 6;

/// Run facts shown in the report header and JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMeta {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: u32,
    pub cutoff: DateTime<Utc>,
}

const STYLE: &str = r#"
  body {
    background:#0f172a; color:#e2e8f0; font-family: system-ui,-apple-system,Segoe UI,Roboto,Ubuntu,"Helvetica Neue",Arial;
    margin: 0; padding: 32px;
  }
  h1 { margin: 0 0 16px 0; font-size: 22px; }
  .toolbar { display:flex; gap:8px; align-items:center; margin: 10px 0 24px 0; flex-wrap: wrap; }
  .toolbar input {
    background:#0b1220; color:#e2e8f0; border:1px solid #23304a; border-radius:6px; padding:8px 10px; min-width:280px;
  }
  table { width: 100%; border-collapse: collapse; background:#0b1220; border:1px solid #23304a; }
  th, td { padding: 10px 12px; border-bottom: 1px solid #1e293b; vertical-align: top; }
  th { background:#0b162a; text-align:left; color:#aebbd3; font-weight:600; }
  a, a:visited { color:#7dd3fc; text-decoration: none; }
  a:hover { text-decoration: underline; }
  .muted { color:#94a3b8; font-size: 12px; margin-top: 6px; }
  .kb { display:inline-block; background:#1e293b; border-radius:4px; padding:1px 6px; margin:0 4px 4px 0; font-family: ui-monospace,monospace; }
  .tag { display:inline-block; border-radius:4px; padding:1px 6px; margin-right:6px; font-size:12px; }
  .tag.security { background:#14532d; }
  .tag.preview { background:#713f12; }
  .tag.oob { background:#7f1d1d; }
  .desc { color:#94a3b8; margin-top:4px; }
  details ul { margin:6px 0; padding-left:18px; }
  tr.empty td { text-align:center; color:#aaa; }
  .nowrap { white-space: nowrap; }
"#;

const SCRIPT: &str = r#"
  (function () {
    var input = document.getElementById('search');
    var rows = document.querySelectorAll('tbody tr.update');
    input.addEventListener('input', function () {
      var needle = input.value.trim().toLowerCase();
      rows.forEach(function (row) {
        row.style.display = !needle || row.textContent.toLowerCase().indexOf(needle) !== -1 ? '' : 'none';
      });
    });
  })();
"#;

pub fn render_html(records: &[UpdateRecord], meta: &ReportMeta) -> String {
    let title = format!("Windows Updates (Last {} Days)", meta.lookback_days);
    let mut out = String::with_capacity(8 * 1024 + records.len() * 1024);

    // 1) head: inline style, nothing external
    out.push_str("<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(out, "<title>{}</title>", encode_text(&title));
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(out, "<style>{}</style>\n</head>\n<body>", STYLE);
    // 2) header and filter box
    let _ = writeln!(out, "  <h1>{}</h1>", encode_text(&title));
    let _ = writeln!(
        out,
        "  <div class=\"muted\">Releases since {} &middot; generated {} &middot; {} update(s)</div>",
        meta.cutoff.format("%b %d, %Y"),
        meta.generated_at.format("%Y-%m-%d %H:%M UTC"),
        records.len()
    );
    out.push_str("  <div class=\"toolbar\"><input id=\"search\" type=\"search\" placeholder=\"Filter by product, KB, title...\" aria-label=\"Filter updates\"></div>\n");
    out.push_str("  <table>\n    <thead>\n      <tr><th>Product</th><th>KB</th><th>Update</th><th>Known issues</th><th>Release date</th><th>Source</th></tr>\n    </thead>\n    <tbody>\n");

    // 3) rows, or the single placeholder row
    if records.is_empty() {
        let _ = writeln!(out, "      <tr class=\"empty\"><td colspan=\"{}\">{}</td></tr>", COLUMNS, EMPTY_MESSAGE);
    } else {
        for record in records {
            render_row(&mut out, record);
        }
    }

    out.push_str("    </tbody>\n  </table>\n");
    let _ = writeln!(out, "<script>{}</script>\n</body>\n</html>", SCRIPT);
    out
}

fn render_row(out: &mut String, r: &UpdateRecord) {
    let link = encode_double_quoted_attribute(&r.source_link);

    let kbs: String = kb_placeholder_display(&r.kb_ids)
        .iter()
        .map(|kb| {
            if kb == KB_PLACEHOLDER {
                kb.clone()
            } else {
                format!("<span class=\"kb\">{}</span>", encode_text(kb))
            }
        })
        .collect();

    // type tag, title, then the summary underneath
    let mut update = format!(
        "<span class=\"tag {}\">{}</span>{}",
        r.update_type.css_class(),
        encode_text(r.update_type.label()),
        encode_text(&r.title)
    );
    if !r.description.is_empty() {
        let _ = write!(update, "<div class=\"desc\">{}</div>", encode_text(&r.description));
    }

    let issues = if r.known_issues.is_empty() {
        "<span class=\"muted\">None reported</span>".to_string()
    } else {
        let items: String = r
            .known_issues
            .iter()
            .map(|i| format!("<li>{}</li>", encode_text(i)))
            .collect();
        format!(
            "<details><summary>{} issue(s)</summary><ul>{}</ul><a href=\"{}\" target=\"_blank\" rel=\"noopener\">Details</a></details>",
            r.known_issues.len(),
            items,
            link
        )
    };

    let _ = writeln!(
        out,
        "      <tr class=\"update\" data-type=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"nowrap\">{}</td><td><a href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a></td></tr>",
        r.update_type.css_class(),
        encode_text(&r.product),
        kbs,
        update,
        issues,
        r.release_date_display(),
        link,
        encode_text(&r.source_label)
    );
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    lookback_days: u32,
    cutoff: String,
    count: usize,
    updates: &'a [UpdateRecord],
}

pub fn render_json(records: &[UpdateRecord], meta: &ReportMeta) -> Result<String, RenderError> {
    let report = JsonReport {
        generated_at: meta.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        lookback_days: meta.lookback_days,
        cutoff: meta.cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
        count: records.len(),
        updates: records,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Overwrite `path` with `contents`.
pub fn write_output(path: &Path, contents: &str) -> Result<(), RenderError> {
    std::fs::write(path, contents).map_err(|source| RenderError::Io { path: path.to_path_buf(), source })
}
