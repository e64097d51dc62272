use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Shown in place of KB numbers when a record carries none.
pub const KB_PLACEHOLDER: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum UpdateType {
    #[default]
    #[serde(rename = "Security/Quality")]
    SecurityQuality,
    #[serde(rename = "Preview")]
    Preview,
    #[serde(rename = "Out-of-band")]
    OutOfBand,
}

impl UpdateType {
    pub fn label(self) -> &'static str {
        match self {
            UpdateType::SecurityQuality => "Security/Quality",
            UpdateType::Preview => "Preview",
            UpdateType::OutOfBand => "Out-of-band",
        }
    }

    /// Short CSS-friendly token used by the HTML report.
    pub fn css_class(self) -> &'static str {
        match self {
            UpdateType::SecurityQuality => "security",
            UpdateType::Preview => "preview",
            UpdateType::OutOfBand => "oob",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One Windows update announcement, as it appears in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRecord {
    pub product: String,
    /// Sorted, deduplicated, uppercase `KB` + 6-8 digits. May be empty.
    pub kb_ids: Vec<String>,
    pub title: String,
    pub description: String,
    pub known_issues: Vec<String>,
    pub release_date: DateTime<Utc>,
    pub update_type: UpdateType,
    pub source_link: String,
    pub source_label: String,
}

/// Identity used to collapse the same announcement seen more than once.
pub type DedupKey = (String, Vec<String>, String, NaiveDate);

impl UpdateRecord {
    pub fn dedup_key(&self) -> DedupKey {
        (
            self.product.clone(),
            self.kb_ids.clone(),
            self.title.clone(),
            self.release_date.date_naive(),
        )
    }

    /// `Mon DD, YYYY`, the format used in the report table.
    pub fn release_date_display(&self) -> String {
        self.release_date.format("%b %d, %Y").to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn record(product: &str, kbs: &[&str], title: &str, ymd: (i32, u32, u32)) -> UpdateRecord {
        UpdateRecord {
            product: product.to_string(),
            kb_ids: kbs.iter().map(|s| s.to_string()).collect(),
            title: title.to_string(),
            description: String::new(),
            known_issues: Vec::new(),
            release_date: Utc.with_ymd_and_hms(ymd.0, ymd.1, ymd.2, 0, 0, 0).unwrap(),
            update_type: UpdateType::SecurityQuality,
            source_link: "https://support.microsoft.com/help/5044384".to_string(),
            source_label: "Update history page".to_string(),
        }
    }

    #[test]
    fn release_date_display_is_month_day_year() {
        let r = record("Windows 11", &["KB5044384"], "Update", (2025, 11, 6));
        assert_eq!(r.release_date_display(), "Nov 06, 2025");
    }

    #[test]
    fn dedup_key_ignores_time_of_day_and_source_link() {
        let a = record("Windows 11", &["KB5044384"], "Update", (2025, 11, 6));
        let mut b = a.clone();
        b.release_date = Utc.with_ymd_and_hms(2025, 11, 6, 17, 30, 0).unwrap();
        b.source_link = "https://example.com/other".to_string();
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn update_type_serializes_as_label() {
        let json = serde_json::to_string(&UpdateType::OutOfBand).unwrap();
        assert_eq!(json, "\"Out-of-band\"");
        assert_eq!(UpdateType::default(), UpdateType::SecurityQuality);
    }
}
