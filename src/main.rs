use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tracing::error;

use winupdate_report::logging::init_logging;
use winupdate_report::{build_report, write_report, HttpFetcher, ReportConfig};

/// winupdate-report - list recent Windows updates in one HTML page
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults to the built-in update-history pages)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Keep updates released within this many days
    #[arg(short = 'd', long = "lookback-days")]
    lookback_days: Option<u32>,

    /// Timeout in seconds for each request
    #[arg(short = 't', long = "timeout-secs")]
    timeout_secs: Option<u64>,

    /// Attempts per URL before giving up
    #[arg(long = "max-attempts")]
    max_attempts: Option<u32>,

    /// Delay before the first retry, in seconds
    #[arg(long = "base-delay-secs")]
    base_delay_secs: Option<f64>,

    /// Detail pages fetched per update-history page
    #[arg(short = 'n', long = "max-detail-pages")]
    max_detail_pages: Option<usize>,

    /// Where to write the HTML report
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Also write the records as JSON to this path
    #[arg(long = "json")]
    json: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ReportConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::load(path)?,
            None => ReportConfig::default(),
        };

        if let Some(days) = self.lookback_days {
            config.lookback_days = days;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(secs) = self.base_delay_secs {
            config.base_delay_secs = secs;
        }
        if let Some(pages) = self.max_detail_pages {
            config.max_detail_pages = pages;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if self.json.is_some() {
            config.json_output = self.json;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    init_logging();
    let args = Args::parse();

    match run(args) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = %e, "Report generation failed");
            eprintln!("error: {}", e);
            std::process::exit(4);
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = args.into_config()?;
    let fetcher = HttpFetcher::new(config.fetch_settings())?;

    let report = build_report(&fetcher, &config, chrono::Utc::now());
    write_report(&report, &config)?;

    println!("Collected {} updates", report.records.len());
    println!("Wrote {}", config.output.display());
    Ok(())
}
