use tracing_subscriber::{fmt, EnvFilter};

/// JSON lines when `RUST_LOG` is set (scheduled runs), plain text otherwise.
/// Logs go to stderr so stdout stays free for the summary line.
pub fn init_logging() {
    let structured = std::env::var("RUST_LOG").is_ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if structured {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}
