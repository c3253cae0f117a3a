//! Authenticated HTTP transport.
//!
//! All network access goes through the [`HttpClient`] trait so the resolvers and
//! the direct fetcher can be exercised against in-memory fakes. The production
//! implementation, [`ApiClient`], wraps a blocking `reqwest` client with bounded
//! timeouts and a small retry budget for transient transport failures.

use std::thread;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, COOKIE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::AuthCredentials;
use crate::error::{Error, FetchError, Result};

/// Browser-like user agent; the web endpoints reject unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

/// Minimal blocking HTTP surface used by the resolvers and fetchers.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// GET with the session's `Authorization` and `Cookie` headers.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure or non-2xx status.
    fn get_authenticated(&self, url: &str) -> Result<Vec<u8>>;

    /// GET without credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure or non-2xx status.
    fn get_public(&self, url: &str) -> Result<Vec<u8>>;
}

/// Timeouts and retry budget for HTTP calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds. Doubles per retry.
    pub base_backoff_ms: u64,
    /// Upper bound for a single backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 2,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl HttpConfig {
    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

/// Run `op`, retrying retryable failures with exponential backoff.
///
/// Content and status errors other than 5xx/429 are returned immediately.
pub fn with_retry<T, F>(config: &HttpConfig, url: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.backoff(attempt);
                warn!(
                    url = %url,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after transient failure: {}",
                    e
                );
                thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Append percent-encoded query parameters to `base`.
///
/// # Errors
///
/// Returns a transport error if `base` is not a valid absolute URL.
pub fn url_with_params(base: &str, params: &[(&str, &str)]) -> Result<String> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| {
            Error::Fetch(FetchError::Transport {
                url: base.to_string(),
                reason: format!("Invalid URL: {e}"),
            })
        })
}

/// `reqwest`-backed [`HttpClient`] carrying the session credentials.
pub struct ApiClient {
    client: Client,
    credentials: AuthCredentials,
    config: HttpConfig,
}

impl ApiClient {
    /// Build a client with the given credentials and transport settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TLS backend cannot be initialised.
    pub fn new(credentials: AuthCredentials, config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            config,
        })
    }

    fn execute(&self, url: &str, authenticated: bool) -> Result<Vec<u8>> {
        with_retry(&self.config, url, || {
            debug!(url = %url, authenticated, "GET");
            let mut request: RequestBuilder =
                self.client.get(url).header(USER_AGENT, DEFAULT_USER_AGENT);
            if authenticated {
                request = request
                    .header(AUTHORIZATION, self.credentials.authorization_header())
                    .header(COOKIE, self.credentials.session_cookie());
            }

            let response = request.send().map_err(|e| transport_error(url, &e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Fetch(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                }));
            }

            response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| transport_error(url, &e))
        })
    }
}

impl HttpClient for ApiClient {
    fn get_authenticated(&self, url: &str) -> Result<Vec<u8>> {
        self.execute(url, true)
    }

    fn get_public(&self, url: &str) -> Result<Vec<u8>> {
        self.execute(url, false)
    }
}

fn transport_error(url: &str, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Fetch(FetchError::Timeout {
            url: url.to_string(),
        })
    } else {
        Error::Fetch(FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
