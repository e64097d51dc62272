//! Collects Windows update announcements from Microsoft support pages and
//! feeds into one deduplicated, date-windowed HTML report.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod render;

pub use config::{ReportConfig, SourceConfig, SourceKind};
pub use error::{ConfigError, DateParseError, FetchError, ParseError, RenderError, SourceError};
pub use fetcher::{Fetch, FetchSettings, HttpFetcher, RetryPolicy};
pub use pipeline::{build_report, collect, write_report, Report};
pub use record::{UpdateRecord, UpdateType};
pub use render::ReportMeta;
