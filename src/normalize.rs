//! Turns parser candidates into `UpdateRecord`s: KB extraction, date
//! parsing, update-type classification and text cleanup.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::config::SourceConfig;
use crate::error::DateParseError;
use crate::parser::Candidate;
use crate::record::{UpdateRecord, UpdateType, KB_PLACEHOLDER};

pub static KB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bKB\d{6,8}\b").unwrap());
pub static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec|January|February|March|April|June|July|August|September|October|November|December)\.?\s+\d{1,2},\s+\d{4}\b",
    )
    .unwrap()
});
static RE_HEADLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(.*?)\s*(?:–|-|—|:)").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->").unwrap());
static RE_BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(?:p|br|div|li|ul|ol|h[1-6]|tr|td|th|table|section|article|blockquote)\b[^>]*>").unwrap()
});
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b\.?").unwrap());
static RE_WEEKDAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{3,9},\s*").unwrap());
static RE_MONTH_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]{3})\.").unwrap());

/// Prose and ISO date layouts tried after RFC 2822 / RFC 3339.
const DATE_FORMATS: [&str; 4] = ["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%d %B %Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Sorted, deduplicated, uppercase KB numbers found anywhere in `text`.
pub fn extract_kbs(text: &str) -> Vec<String> {
    KB_RE
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_uppercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Display form of a KB set: the placeholder when there is nothing to show.
pub fn kb_placeholder_display(kbs: &[String]) -> Vec<String> {
    if kbs.is_empty() {
        vec![KB_PLACEHOLDER.to_string()]
    } else {
        kbs.to_vec()
    }
}

/// First `Month D, YYYY` style date inside free text.
pub fn find_date_text(text: &str) -> Option<&str> {
    DATE_RE.find(text).map(|m| m.as_str())
}

pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(DateParseError::Missing);
    }
    if let Some(dt) = parse_exact(s) {
        return Ok(dt);
    }
    // A prose date buried in a longer line ("Released Nov 06, 2025").
    if let Some(found) = find_date_text(s) {
        if let Some(dt) = parse_exact(found) {
            return Ok(dt);
        }
    }
    Err(DateParseError::Unrecognized(s.to_string()))
}

fn parse_exact(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Feeds often carry a weekday that disagrees with the date; it adds nothing.
    let without_weekday = RE_WEEKDAY.replace(s, "");
    if without_weekday.as_ref() != s {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&without_weekday) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    let prose = RE_SEPT.replace_all(s, "Sep");
    let prose = RE_MONTH_DOT.replace(&prose, "$1");
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&prose, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Missing or unparseable dates become the Unix epoch so the record sorts
/// last and falls outside any lookback window.
pub fn release_date_or_epoch(raw: Option<&str>) -> DateTime<Utc> {
    match raw.map(parse_date).unwrap_or(Err(DateParseError::Missing)) {
        Ok(dt) => dt,
        Err(e) => {
            debug!(error = %e, "Using epoch for release date");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

pub fn classify(title: &str, description: &str) -> UpdateType {
    let title = title.to_lowercase();
    let description = description.to_lowercase();
    if title.contains("out-of-band") || description.contains("out-of-band") {
        UpdateType::OutOfBand
    } else if title.contains("preview") || description.contains("preview") {
        UpdateType::Preview
    } else {
        UpdateType::SecurityQuality
    }
}

/// First phrase of a line, up to the first dash or colon.
pub fn headline(line: &str) -> String {
    match RE_HEADLINE.captures(line).and_then(|c| c.get(1)) {
        Some(m) if !m.as_str().trim().is_empty() => m.as_str().trim().to_string(),
        _ => line.trim().to_string(),
    }
}

/// Remove markup from a fragment and collapse it to a single line.
pub fn strip_html(input: &str) -> String {
    let without_code = RE_SCRIPT_STYLE.replace_all(input, " ");
    let spaced = RE_BLOCK_TAG.replace_all(&without_code, " ");
    let without_tags = RE_TAG.replace_all(&spaced, "");
    clean_text(&decode_html_entities(&without_tags))
}

/// Repair mojibake, normalize Unicode and collapse whitespace.
pub fn clean_text(s: &str) -> String {
    fn collapse(inp: &str) -> String {
        let out: String = inp
            .nfkc()
            .map(|c| if c == '\u{00A0}' { ' ' } else { c })
            .filter(|&c| c == '\t' || c == '\n' || c == '\r' || (c as u32) >= 0x20)
            .collect();
        RE_WHITESPACE.replace_all(&out, " ").trim().to_string()
    }

    fn looks_garbled(s: &str) -> bool {
        s.contains('Ã') || s.contains('â') || s.contains('\u{FFFD}')
    }

    if !looks_garbled(s) {
        return collapse(s);
    }

    // UTF-8 read as Windows-1252: encode back to the original bytes and decode again.
    let mut cur = s.to_string();
    for _ in 0..3 {
        let (bytes, _, unmappable) = encoding_rs::WINDOWS_1252.encode(&cur);
        if unmappable {
            break;
        }
        match String::from_utf8(bytes.into_owned()) {
            Ok(redecoded) if redecoded != cur => cur = redecoded,
            _ => break,
        }
        if !looks_garbled(&cur) {
            break;
        }
    }

    collapse(&cur)
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || key == "fbclid" || key == "gclid"
}

/// Drop the fragment and tracking parameters so the same page compares equal.
/// Strings that are not absolute URLs come back unchanged.
pub fn canonicalize_url(s: &str) -> String {
    let Ok(mut url) = Url::parse(s) else {
        return s.to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&kept);
    }
    url.into()
}

/// Build a record from a candidate. Returns `None` when there is no usable title.
pub fn normalize(candidate: &Candidate, source: &SourceConfig) -> Option<UpdateRecord> {
    let title = strip_html(&candidate.title);
    if title.is_empty() {
        debug!(source = %source.product, link = ?candidate.link, "Dropping candidate without a title");
        return None;
    }

    let description = candidate.description.as_deref().map(strip_html).unwrap_or_default();
    let known_issues: Vec<String> = candidate
        .known_issues
        .iter()
        .map(|s| strip_html(s))
        .filter(|s| !s.is_empty())
        .collect();
    let kb_ids = extract_kbs(&format!("{}\n{}\n{}", title, description, candidate.raw_text));
    let release_date = release_date_or_epoch(candidate.raw_date.as_deref());
    let update_type = classify(&title, &description);
    let source_link = canonicalize_url(candidate.link.as_deref().unwrap_or(&source.url));

    Some(UpdateRecord {
        product: source.product.clone(),
        kb_ids,
        title,
        description,
        known_issues,
        release_date,
        update_type,
        source_link,
        source_label: source.label().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use chrono::TimeZone;

    #[test]
    fn extract_kbs_uppercases_sorts_and_dedups() {
        let text = "kb5044384 fixes KB5044384 and KB501; see also Kb5043080 and KB123456789";
        assert_eq!(extract_kbs(text), vec!["KB5043080", "KB5044384"]);
    }

    #[test]
    fn extract_kbs_requires_word_boundaries() {
        assert!(extract_kbs("XKB5044384 KB50443841234").is_empty());
        assert_eq!(extract_kbs("/help/kb5044384-update"), vec!["KB5044384"]);
    }

    #[test]
    fn extracted_kbs_always_match_pattern() {
        let inputs = ["", "KB", "KB12345", "kb1234567 KB12345678 kB99999999", "\u{FFFD}KB7654321\u{00A0}"];
        let pattern = Regex::new(r"^KB\d{6,8}$").unwrap();
        for input in inputs {
            let kbs = extract_kbs(input);
            assert!(kbs.iter().all(|k| pattern.is_match(k)), "{:?}", kbs);
            let mut sorted = kbs.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(kbs, sorted);
        }
    }

    #[test]
    fn placeholder_is_display_only() {
        assert_eq!(kb_placeholder_display(&[]), vec!["—"]);
        assert_eq!(kb_placeholder_display(&["KB5044384".to_string()]), vec!["KB5044384"]);
    }

    #[test]
    fn parses_rfc822_feed_dates() {
        let dt = parse_date("Tue, 05 Nov 2025 00:00:00 GMT").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 11, 5, 0, 0, 0).unwrap());

        let consistent = parse_date("Wed, 05 Nov 2025 08:30:00 +0000").unwrap();
        assert_eq!(consistent, Utc.with_ymd_and_hms(2025, 11, 5, 8, 30, 0).unwrap());
    }

    #[test]
    fn parses_prose_and_iso_dates() {
        let expected = Utc.with_ymd_and_hms(2025, 10, 8, 0, 0, 0).unwrap();
        assert_eq!(parse_date("October 8, 2025").unwrap(), expected);
        assert_eq!(parse_date("Oct 08, 2025").unwrap(), expected);
        assert_eq!(parse_date("2025-10-08").unwrap(), expected);
        assert_eq!(parse_date("2025-10-08T00:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_date("Sept 9, 2025").unwrap(),
            Utc.with_ymd_and_hms(2025, 9, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_date_embedded_in_text() {
        assert_eq!(
            parse_date("Released Nov 06, 2025").unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 6, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn unparseable_dates_are_errors_and_fall_back_to_epoch() {
        assert_eq!(parse_date("   "), Err(DateParseError::Missing));
        assert!(matches!(parse_date("next Patch Tuesday"), Err(DateParseError::Unrecognized(_))));
        assert_eq!(release_date_or_epoch(Some("soon")), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(release_date_or_epoch(None), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn classify_prefers_out_of_band() {
        assert_eq!(classify("Out-of-band update preview", ""), UpdateType::OutOfBand);
        assert_eq!(classify("KB5044384", "This OUT-OF-BAND update fixes"), UpdateType::OutOfBand);
        assert_eq!(classify("Preview update", ""), UpdateType::Preview);
        assert_eq!(classify("Cumulative update", "non-security PREVIEW release"), UpdateType::Preview);
        assert_eq!(classify("Cumulative update", "security fixes"), UpdateType::SecurityQuality);
    }

    #[test]
    fn headline_stops_at_dash_or_colon() {
        assert_eq!(headline("Update for Windows 11 — KB5044384"), "Update for Windows 11");
        assert_eq!(headline("Servicing stack: KB5043080"), "Servicing stack");
        assert_eq!(headline("KB5044384 (OS Build 26100.2161)"), "KB5044384 (OS Build 26100.2161)");
        assert_eq!(headline("— KB5044384"), "— KB5044384");
    }

    #[test]
    fn strip_html_removes_markup_and_collapses_whitespace() {
        let html = "<div><p>Fixes   an <b>issue</b>&nbsp;in</p>\n<p>Explorer &amp; Start.</p><script>var kb='KB1234567';</script></div>";
        assert_eq!(strip_html(html), "Fixes an issue in Explorer & Start.");
    }

    #[test]
    fn clean_text_repairs_mojibake() {
        assert_eq!(clean_text("Windows 11 â€” KB5044384"), "Windows 11 — KB5044384");
        assert_eq!(clean_text("  plain\t\ttext \n"), "plain text");
    }

    #[test]
    fn canonicalize_drops_fragment_and_tracking() {
        assert_eq!(
            canonicalize_url("https://support.microsoft.com/help/5044384?utm_source=x&ocid=1#known-issues"),
            "https://support.microsoft.com/help/5044384?ocid=1"
        );
        assert_eq!(
            canonicalize_url("https://support.microsoft.com/help/5044384?UTM_Medium=rss&fbclid=abc"),
            "https://support.microsoft.com/help/5044384"
        );
        assert_eq!(canonicalize_url("not a url"), "not a url");
    }

    #[test]
    fn normalizes_flat_text_block() {
        let source = SourceConfig::new("Windows 11", "https://support.microsoft.com/topic/x", SourceKind::FlatText);
        let candidate = Candidate {
            title: "Update for Windows 11".into(),
            raw_date: Some("Nov 06, 2025".into()),
            raw_text: "Update for Windows 11 — KB5044384\nReleased Nov 06, 2025".into(),
            ..Candidate::default()
        };
        let record = normalize(&candidate, &source).unwrap();
        assert_eq!(record.kb_ids, vec!["KB5044384"]);
        assert_eq!(record.title, "Update for Windows 11");
        assert_eq!(record.release_date, Utc.with_ymd_and_hms(2025, 11, 6, 0, 0, 0).unwrap());
        assert_eq!(record.source_link, "https://support.microsoft.com/topic/x");
        assert_eq!(record.source_label, "Support page text");
        assert_eq!(record.update_type, UpdateType::SecurityQuality);
    }

    #[test]
    fn drops_candidates_without_title() {
        let source = SourceConfig::new("Windows 11", "https://example.com/", SourceKind::Feed);
        let candidate = Candidate { title: "<span> </span>".into(), ..Candidate::default() };
        assert!(normalize(&candidate, &source).is_none());
    }
}
