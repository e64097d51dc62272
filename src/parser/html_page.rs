//! Support "update history" pages: a list of links to per-KB detail pages,
//! each of which carries the date, a summary and the known issues.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::flat_text::flatten_document;
use super::Candidate;
use crate::error::ParseError;
use crate::normalize::{canonicalize_url, clean_text, find_date_text, KB_RE};

static SEL_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static SEL_FLOW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, p, li, td, time").unwrap());

const MAX_ANCHORS: usize = 2000;
const DATE_LOOKAHEAD: usize = 8;
const ISSUE_LOOKAHEAD: usize = 40;
const MIN_ISSUE_PARAGRAPH_CHARS: usize = 20;

/// What a KB detail page contributes to its candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPage {
    pub heading: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub known_issues: Vec<String>,
}

pub fn parse_index(html: &str, base: &Url) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for a in document.select(&SEL_ANCHOR).take(MAX_ANCHORS) {
        let Some(href) = a.value().attr("href") else { continue };
        let text = element_text(&a);
        if !is_update_link(&text, href) {
            continue;
        }
        let Ok(abs) = base.join(href) else { continue };
        if abs.scheme() != "http" && abs.scheme() != "https" {
            continue;
        }
        let link = canonicalize_url(abs.as_str());
        if !seen.insert(link.clone()) {
            continue;
        }

        candidates.push(Candidate {
            raw_date: find_date_text(&text).map(str::to_string),
            raw_text: format!("{} {}", text, href),
            title: text,
            link: Some(link),
            description: None,
            known_issues: Vec::new(),
        });
    }

    candidates
}

fn is_update_link(text: &str, href: &str) -> bool {
    KB_RE.is_match(text) || KB_RE.is_match(href) || href.to_lowercase().contains("/help/")
}

pub fn parse_detail(html: &str) -> Result<DetailPage, ParseError> {
    let document = Html::parse_document(html);
    let flow: Vec<ElementRef<'_>> = document.select(&SEL_FLOW).collect();
    let first_heading = flow.iter().position(is_heading);

    let heading = first_heading.map(|i| element_text(&flow[i])).filter(|s| !s.is_empty());
    let description = first_paragraph(&flow, first_heading);
    let known_issues = known_issues(&flow);
    let date = date_near_heading(&flow, first_heading)
        .or_else(|| flow.iter().find_map(time_marker))
        .or_else(|| find_date_text(&flatten_document(&document)).map(str::to_string));

    if heading.is_none() && description.is_none() && date.is_none() {
        return Err(ParseError::NoContent);
    }

    Ok(DetailPage { heading, date, description, known_issues })
}

fn is_heading(e: &ElementRef<'_>) -> bool {
    matches!(e.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn element_text(e: &ElementRef<'_>) -> String {
    clean_text(&e.text().collect::<Vec<_>>().join(" "))
}

fn time_marker(e: &ElementRef<'_>) -> Option<String> {
    if e.value().name() != "time" {
        return None;
    }
    e.value()
        .attr("datetime")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| Some(element_text(e)).filter(|s| !s.is_empty()))
}

// The heading and what follows it first, then the closest paragraph or <time> before it.
fn date_near_heading(flow: &[ElementRef<'_>], heading: Option<usize>) -> Option<String> {
    let h = heading?;
    let after = flow[h..].iter().take(DATE_LOOKAHEAD + 1).find_map(|e| {
        time_marker(e).or_else(|| find_date_text(&element_text(e)).map(str::to_string))
    });
    if after.is_some() {
        return after;
    }
    flow[..h].iter().rev().filter(|e| matches!(e.value().name(), "p" | "time")).find_map(|e| {
        time_marker(e).or_else(|| find_date_text(&element_text(e)).map(str::to_string))
    })
}

fn first_paragraph(flow: &[ElementRef<'_>], heading: Option<usize>) -> Option<String> {
    let paragraph = |e: &ElementRef<'_>| {
        if e.value().name() != "p" {
            return None;
        }
        Some(element_text(e)).filter(|s| !s.is_empty())
    };
    heading
        .and_then(|h| flow[h + 1..].iter().find_map(paragraph))
        .or_else(|| flow.iter().find_map(paragraph))
}

fn inside_list_item(e: &ElementRef<'_>) -> bool {
    e.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "li")
}

fn known_issues(flow: &[ElementRef<'_>]) -> Vec<String> {
    let Some(start) = flow
        .iter()
        .position(|e| is_heading(e) && element_text(e).to_lowercase().contains("known issues"))
    else {
        return Vec::new();
    };

    let mut items = Vec::new();
    let mut paragraphs = Vec::new();
    for e in flow[start + 1..].iter().take(ISSUE_LOOKAHEAD) {
        if is_heading(e) {
            break;
        }
        let text = element_text(e);
        if text.is_empty() {
            continue;
        }
        match e.value().name() {
            // A nested item's text is already part of its parent item.
            "li" if !inside_list_item(e) => items.push(text),
            "p" | "td" if !inside_list_item(e) && text.chars().count() >= MIN_ISSUE_PARAGRAPH_CHARS => {
                paragraphs.push(text)
            }
            _ => {}
        }
    }

    if items.is_empty() {
        paragraphs
    } else {
        items
    }
}
