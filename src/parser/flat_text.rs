//! Legacy mode: read a page as plain text and treat every KB-bearing
//! block as an update.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::Candidate;
use crate::normalize::{find_date_text, headline, KB_RE};

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];
const BLOCK_TAGS: [&str; 22] = [
    "p", "div", "section", "article", "header", "footer", "nav", "aside", "main", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "li", "table", "tr", "blockquote", "br",
];

pub fn parse_flat_text(html: &str) -> Vec<Candidate> {
    let text = flatten_text(html);
    split_blocks(&text).into_iter().filter_map(block_candidate).collect()
}

pub fn flatten_text(html: &str) -> String {
    flatten_document(&Html::parse_document(html))
}

/// Visible text, one line per text line; block elements start a new block.
pub fn flatten_document(document: &Html) -> String {
    let mut out = String::new();
    walk(document.root_element(), &mut out);
    out
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            walk(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            push_text_lines(text, out);
        }
    }

    if block {
        out.push('\n');
    }
}

// Blank lines inside one text node are kept; whitespace-only nodes between tags are not.
fn push_text_lines(text: &str, out: &mut String) {
    let mut seen_content = false;
    let mut pending_break = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            pending_break = seen_content;
            continue;
        }
        if pending_break {
            out.push('\n');
            pending_break = false;
        }
        out.push_str(line);
        out.push('\n');
        seen_content = true;
    }
}

pub fn split_blocks(text: &str) -> Vec<&str> {
    RE_BLANK_LINES
        .split(text)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect()
}

fn block_candidate(block: &str) -> Option<Candidate> {
    if !KB_RE.is_match(block) {
        return None;
    }
    let lines: Vec<&str> = block.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let title = headline(lines.first()?);
    // Whole block, first line included: the type keywords often sit there.
    let description = Some(lines.join(" "));

    Some(Candidate {
        title,
        link: None,
        raw_date: find_date_text(block).map(str::to_string),
        description,
        known_issues: Vec::new(),
        raw_text: block.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceConfig, SourceKind};
    use crate::normalize::normalize;
    use crate::record::UpdateType;

    #[test]
    fn plain_text_block_becomes_candidate() {
        let candidates = parse_flat_text("Update for Windows 11 — KB5044384\nReleased Nov 06, 2025");
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.title, "Update for Windows 11");
        assert_eq!(c.raw_date.as_deref(), Some("Nov 06, 2025"));
        assert_eq!(c.description.as_deref(), Some("Update for Windows 11 — KB5044384 Released Nov 06, 2025"));
        assert!(c.raw_text.contains("KB5044384"));
    }

    #[test]
    fn blocks_follow_block_elements_and_skip_scripts() {
        let html = r#"<html><head><style>.kb { color: red }</style></head><body>
            <h2>October 8, 2025 — <a href="/help/5066835">KB5066835</a></h2>
            <p>Released October 8, 2025</p>
            <script>var x = "KB9999999";</script>
            <div>
              <h2>Servicing stack update: KB5066131</h2>
            </div>
            <p>No KB in this paragraph.</p>
        </body></html>"#;
        let candidates = parse_flat_text(html);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "October 8, 2025");
        assert!(candidates[0].raw_text.contains("KB5066835"));
        assert_eq!(candidates[1].title, "Servicing stack update");
        assert!(candidates.iter().all(|c| !c.raw_text.contains("KB9999999")));
    }

    #[test]
    fn blank_lines_inside_text_split_blocks() {
        let text = flatten_text("KB5044384 first\nline two\n\n\nKB5043080 second");
        let blocks = split_blocks(&text);
        assert_eq!(blocks, vec!["KB5044384 first\nline two", "KB5043080 second"]);
    }

    fn classify_block(text: &str) -> UpdateType {
        let source = SourceConfig::new("Windows 11", "https://support.microsoft.com/help", SourceKind::FlatText);
        let candidates = parse_flat_text(text);
        assert_eq!(candidates.len(), 1);
        normalize(&candidates[0], &source).unwrap().update_type
    }

    #[test]
    fn first_line_keywords_drive_update_type() {
        assert_eq!(
            classify_block("Out-of-band update for Windows 11 — KB5044384\nReleased Nov 06, 2025"),
            UpdateType::OutOfBand
        );
        assert_eq!(
            classify_block("October 28, 2025 - KB5067036 Preview\nNon-security release"),
            UpdateType::Preview
        );
        assert_eq!(
            classify_block("November 11, 2025 - KB5068861\nSecurity release"),
            UpdateType::SecurityQuality
        );
    }

    #[test]
    fn block_without_kb_is_ignored() {
        assert!(parse_flat_text("<p>Windows 11 release notes</p><p>Nov 06, 2025</p>").is_empty());
    }
}
