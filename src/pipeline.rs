//! Fetch, parse, normalize and aggregate every configured source, then
//! write the report.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use crate::aggregate::{aggregate, lookback_cutoff};
use crate::config::{ReportConfig, SourceConfig, SourceKind};
use crate::error::{FetchError, RenderError, SourceError};
use crate::fetcher::Fetch;
use crate::normalize::normalize;
use crate::parser::html_page::{parse_detail, DetailPage};
use crate::parser::{decode_body, parse_source, Candidate};
use crate::record::UpdateRecord;
use crate::render::{render_html, render_json, write_output, ReportMeta};

#[derive(Debug, Clone)]
pub struct Report {
    pub records: Vec<UpdateRecord>,
    pub meta: ReportMeta,
}

/// Records from every source, in source order. A source that fails is
/// logged and contributes nothing.
pub fn collect<F: Fetch + ?Sized>(fetcher: &F, config: &ReportConfig) -> Vec<UpdateRecord> {
    let mut records = Vec::new();
    for source in &config.sources {
        match collect_source(fetcher, source, config.max_detail_pages) {
            Ok(found) => {
                info!(source = %source.product, url = %source.url, count = found.len(), "Collected source");
                records.extend(found);
            }
            Err(e) => warn!(source = %source.product, url = %source.url, error = %e, "Skipping source"),
        }
    }
    records
}

pub fn collect_source<F: Fetch + ?Sized>(
    fetcher: &F,
    source: &SourceConfig,
    max_detail_pages: usize,
) -> Result<Vec<UpdateRecord>, SourceError> {
    // 1) fetch and parse the source document
    let url = Url::parse(&source.url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", source.url, e)))?;
    let body = fetcher.fetch(&url)?;
    let mut candidates = parse_source(&body, source.kind, &url)?;
    debug!(source = %source.product, count = candidates.len(), "Parsed candidates");

    // 2) history pages only list links; the details live one hop away
    if source.kind == SourceKind::HtmlPage {
        candidates = enrich_from_detail_pages(fetcher, source, candidates, max_detail_pages);
    }

    // 3) candidates without a title are dropped here
    Ok(candidates.iter().filter_map(|c| normalize(c, source)).collect())
}

// The first `limit` candidates are replaced by their detail-page view; a
// detail page that cannot be fetched or read drops its candidate.
fn enrich_from_detail_pages<F: Fetch + ?Sized>(
    fetcher: &F,
    source: &SourceConfig,
    candidates: Vec<Candidate>,
    limit: usize,
) -> Vec<Candidate> {
    let mut enriched = Vec::with_capacity(candidates.len());
    for (i, mut candidate) in candidates.into_iter().enumerate() {
        if i >= limit {
            enriched.push(candidate);
            continue;
        }
        let Some(link) = candidate.link.as_deref().and_then(|l| Url::parse(l).ok()) else {
            enriched.push(candidate);
            continue;
        };

        let page = match fetcher.fetch(&link) {
            Ok(body) => parse_detail(&decode_body(&body)).map_err(SourceError::from),
            Err(e) => Err(SourceError::from(e)),
        };
        match page {
            Ok(page) => {
                apply_detail(&mut candidate, page);
                enriched.push(candidate);
            }
            Err(e) => warn!(source = %source.product, url = %link, error = %e, "Skipping detail page"),
        }
    }
    enriched
}

fn apply_detail(candidate: &mut Candidate, page: DetailPage) {
    if candidate.title.trim().is_empty() {
        if let Some(heading) = &page.heading {
            candidate.title = heading.clone();
        }
    }
    if page.date.is_some() {
        candidate.raw_date = page.date;
    }
    if page.description.is_some() {
        candidate.description = page.description;
    }
    candidate.known_issues = page.known_issues;
    if let Some(heading) = page.heading {
        candidate.raw_text.push('\n');
        candidate.raw_text.push_str(&heading);
    }
}

pub fn build_report<F: Fetch + ?Sized>(fetcher: &F, config: &ReportConfig, now: DateTime<Utc>) -> Report {
    let cutoff = lookback_cutoff(now, config.lookback_days);
    let collected = collect(fetcher, config);
    let total = collected.len();
    let records = aggregate(collected, cutoff);
    info!(collected = total, count = records.len(), cutoff = %cutoff, "Aggregated updates");

    Report {
        records,
        meta: ReportMeta { generated_at: now, lookback_days: config.lookback_days, cutoff },
    }
}

/// Writes the HTML report and, when configured, the JSON sidecar.
pub fn write_report(report: &Report, config: &ReportConfig) -> Result<(), RenderError> {
    write_output(&config.output, &render_html(&report.records, &report.meta))?;
    info!(path = %config.output.display(), count = report.records.len(), "Wrote HTML report");

    if let Some(path) = &config.json_output {
        write_output(path, &render_json(&report.records, &report.meta)?)?;
        info!(path = %path.display(), "Wrote JSON report");
    }
    Ok(())
}
