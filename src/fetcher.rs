use rand::{thread_rng, Rng};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::collections::HashMap;
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Anything that can turn a URL into response bytes.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Jitter grows linearly: up to `jitter_step * retry` is added.
    pub jitter_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(30),
            jitter_step: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1 = first retry). `jitter` is a
    /// sample in `[0, 1)`.
    pub fn delay_for(&self, retry: u32, jitter: f64) -> Duration {
        let exponent = retry.saturating_sub(1).min(62) as i32;
        let backoff = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        let jitter = self.jitter_step.as_secs_f64() * f64::from(retry) * jitter.clamp(0.0, 1.0);
        let capped = (backoff + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Keyed by primary URL.
    pub fallbacks: HashMap<String, String>,
}

/// Blocking HTTP fetcher with fixed headers, capped exponential backoff and
/// a one-shot fallback URL on 404.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    fallbacks: HashMap<String, Url>,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::Client)?;

        let mut fallbacks = HashMap::new();
        for (primary, fallback) in settings.fallbacks {
            // Keys are compared against parsed URLs, so store them in the same form.
            let key = Url::parse(&primary).map(String::from).unwrap_or(primary);
            match Url::parse(&fallback) {
                Ok(u) => { fallbacks.insert(key, u); }
                Err(e) => warn!(primary = %key, fallback = %fallback, error = %e, "Ignoring unparseable fallback URL"),
            }
        }

        Ok(Self { client, retry: settings.retry, fallbacks })
    }

    fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(url = %url, "GET");
        let resp = self
            .client
            .get(url.as_str())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .send()
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })?;

        // any non-2xx status becomes an error
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let body = resp
            .bytes()
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })?;
        Ok(body.to_vec())
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut current = url.clone();
        let mut fallback_used = false;
        let mut attempt = 0u32;
        let mut wait = false;

        loop {
            // back off before every retry, never before the first try or a fallback switch
            if wait {
                let delay = self.retry.delay_for(attempt, thread_rng().gen::<f64>());
                debug!(url = %current, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                sleep(delay);
            }
            attempt += 1;

            match self.fetch_once(&current) {
                Ok(body) => return Ok(body),
                Err(e) if e.is_not_found() => {
                    // 404 is permanent; only a configured fallback gets another try.
                    match self.fallbacks.get(url.as_str()) {
                        Some(fallback) if !fallback_used => {
                            warn!(url = %current, fallback = %fallback, "Primary URL returned 404, trying fallback");
                            current = fallback.clone();
                            fallback_used = true;
                            attempt -= 1;
                            wait = false;
                        }
                        _ => return Err(e),
                    }
                }
                // transport errors and other statuses: retry until attempts run out
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(FetchError::Exhausted {
                            url: current.to_string(),
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    warn!(url = %current, attempt, max_attempts, error = %e, "Fetch attempt failed");
                    wait = true;
                }
            }
        }
    }
}
