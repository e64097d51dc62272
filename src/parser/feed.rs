//! RSS 2.0 / RSS 1.0 / Atom feeds read with quick-xml.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use url::Url;

use super::{decode_body, Candidate};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
    Description,
}

fn field_for(local_name: &[u8]) -> Option<Field> {
    match local_name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"date" | b"issued" => Some(Field::Published),
        b"updated" | b"modified" => Some(Field::Updated),
        b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Description),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    description: Option<String>,
}

impl Entry {
    // First non-empty value for a field wins.
    fn set(&mut self, field: Field, value: String) {
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Description => &mut self.description,
        };
        slot.get_or_insert(value);
    }

    fn into_candidate(self, base: &Url) -> Candidate {
        let link = self
            .link
            .map(|l| base.join(l.trim()).map(String::from).unwrap_or(l));
        let title = self.title.unwrap_or_default();
        let raw_text = format!("{}\n{}", title, self.description.as_deref().unwrap_or(""));
        Candidate {
            title,
            link,
            raw_date: self.published.or(self.updated),
            description: self.description,
            known_issues: Vec::new(),
            raw_text,
        }
    }
}

// Atom: only an alternate (or unlabelled) link points at the page.
fn alternate_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"rel" => rel = attr.unescape_value().ok().map(|v| v.into_owned()),
            _ => {}
        }
    }
    match rel.as_deref() {
        None | Some("alternate") => href,
        _ => None,
    }
}

pub fn parse_feed(bytes: &[u8], base: &Url) -> Result<Vec<Candidate>, ParseError> {
    let text = decode_body(bytes);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut saw_feed_root = false;
    let mut candidates = Vec::new();
    let mut entry: Option<Entry> = None;
    // Element depth below the open <item>/<entry>.
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    let mut value = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseError::Xml(format!("at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if entry.is_none() {
                    match e.local_name().as_ref() {
                        b"rss" | b"RDF" | b"feed" | b"channel" => saw_feed_root = true,
                        b"item" | b"entry" => {
                            entry = Some(Entry::default());
                            depth = 0;
                        }
                        _ => {}
                    }
                    continue;
                }
                depth += 1;
                if depth == 1 {
                    field = field_for(e.local_name().as_ref());
                    value.clear();
                    if field == Some(Field::Link) {
                        if let (Some(href), Some(current)) = (alternate_href(&e), entry.as_mut()) {
                            current.set(Field::Link, href);
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if depth == 0 && e.local_name().as_ref() == b"link" {
                    if let (Some(href), Some(current)) = (alternate_href(&e), entry.as_mut()) {
                        current.set(Field::Link, href);
                    }
                }
            }
            Event::Text(t) => {
                if field.is_some() {
                    let unescaped = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if field.is_some() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if entry.is_none() {
                    continue;
                }
                if depth == 0 {
                    if let Some(done) = entry.take() {
                        candidates.push(done.into_candidate(base));
                    }
                    continue;
                }
                if depth == 1 {
                    if let (Some(f), Some(current)) = (field.take(), entry.as_mut()) {
                        current.set(f, value.trim().to_string());
                    }
                    value.clear();
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if !saw_feed_root && candidates.is_empty() {
        return Err(ParseError::NotAFeed);
    }
    Ok(candidates)
}
