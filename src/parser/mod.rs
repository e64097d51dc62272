//! Source parsers. Every source shape produces the same `Candidate` list.

pub mod feed;
pub mod flat_text;
pub mod html_page;

use url::Url;

use crate::config::SourceKind;
use crate::error::ParseError;

/// A raw, not yet normalized update found in a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub link: Option<String>,
    pub raw_date: Option<String>,
    pub description: Option<String>,
    pub known_issues: Vec<String>,
    /// Text scanned for KB numbers.
    pub raw_text: String,
}

pub fn parse_source(bytes: &[u8], kind: SourceKind, base: &Url) -> Result<Vec<Candidate>, ParseError> {
    match kind {
        SourceKind::HtmlPage => Ok(html_page::parse_index(&decode_body(bytes), base)),
        SourceKind::Feed => feed::parse_feed(bytes, base),
        SourceKind::FlatText => Ok(flat_text::parse_flat_text(&decode_body(bytes))),
    }
}

/// UTF-8 when valid (BOM stripped), otherwise Windows-1252.
pub fn decode_body(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (cow, _had_errors) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            cow.into_owned()
        }
    }
}
