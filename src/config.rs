//! Run configuration: which sources to read and how hard to try.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetcher::{FetchSettings, RetryPolicy};

/// Shape of the document behind a source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Support "update history" page linking to per-KB detail pages.
    HtmlPage,
    /// RSS 2.0 or Atom feed.
    Feed,
    /// Any page read as plain text, split into blocks.
    FlatText,
}

impl SourceKind {
    pub fn default_label(self) -> &'static str {
        match self {
            SourceKind::HtmlPage => "Update history page",
            SourceKind::Feed => "Update Catalog RSS",
            SourceKind::FlatText => "Support page text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub product: String,
    pub url: String,
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SourceConfig {
    pub fn new(product: &str, url: &str, kind: SourceKind) -> Self {
        Self { product: product.to_string(), url: url.to_string(), kind, label: None }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.kind.default_label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub sources: Vec<SourceConfig>,
    /// Oldest release date kept, in days before now
    pub lookback_days: u32,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// First retry delay (seconds); doubles per retry
    pub base_delay_secs: f64,
    /// Cap on any single retry delay (seconds)
    pub max_delay_secs: f64,
    /// Detail pages fetched per update-history page
    pub max_detail_pages: usize,
    /// Fallback URL tried when the primary answers 404
    pub fallbacks: HashMap<String, String>,
    pub output: PathBuf,
    pub json_output: Option<PathBuf>,
}

const HISTORY_PAGES: [(&str, &str); 4] = [
    ("Windows 11", "windows-11-update-history-204a3c9a-fd7d-4f3c-943a-0d77b2a95ad9"),
    ("Windows 10 22H2", "windows-10-update-history-33a9f41b-5bb6-4c7d-ada0-b5f1b6a3b1a7"),
    ("Windows Server 2022", "windows-server-2022-update-history-9580de3b-8d02-4d06-b78b-0e3d839e32cd"),
    ("Windows Server 2019", "windows-server-2019-update-history-8450c17c-6f6d-4f9b-9f43-5a1938b1f52f"),
];

/// About a century; anything larger is a typo.
const MAX_LOOKBACK_DAYS: u32 = 36_500;
/// Upper bound for any configured retry delay (seconds).
const MAX_DELAY_SECS: f64 = 3600.0;

// Out-of-range values (NaN included) never reach `Duration`.
fn delay_from_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_DELAY_SECS)).unwrap_or_default()
}

impl Default for ReportConfig {
    fn default() -> Self {
        let mut sources = Vec::new();
        let mut fallbacks = HashMap::new();
        for (product, slug) in HISTORY_PAGES {
            let primary = format!("https://support.microsoft.com/topic/{}", slug);
            fallbacks.insert(primary.clone(), format!("https://support.microsoft.com/en-us/topic/{}", slug));
            sources.push(SourceConfig::new(product, &primary, SourceKind::HtmlPage));
        }

        Self {
            sources,
            lookback_days: 30,
            timeout_secs: 30,
            max_attempts: 3,
            base_delay_secs: 1.5,
            max_delay_secs: 30.0,
            max_detail_pages: 25,
            fallbacks,
            output: PathBuf::from("index.html"),
            json_output: None,
        }
    }
}

impl ReportConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ReportConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid(format!(
                "lookback_days must be between 1 and {}",
                MAX_LOOKBACK_DAYS
            )));
        }
        for (name, secs) in [("base_delay_secs", self.base_delay_secs), ("max_delay_secs", self.max_delay_secs)] {
            if !(0.0..=MAX_DELAY_SECS).contains(&secs) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and {} seconds, got {}",
                    name, MAX_DELAY_SECS, secs
                )));
            }
        }
        if let Some(bad) = self.sources.iter().find(|s| url::Url::parse(&s.url).is_err()) {
            return Err(ConfigError::Invalid(format!("source URL is not absolute: {}", bad.url)));
        }
        Ok(())
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: delay_from_secs(self.base_delay_secs),
                max_delay: delay_from_secs(self.max_delay_secs),
                ..RetryPolicy::default()
            },
            fallbacks: self.fallbacks.clone(),
        }
    }
}
