//! Single-hop HTTP probing.
//!
//! A probe issues one request without following redirects and reports
//! whether the response points somewhere else. Transient failures
//! (timeouts, connection resets, HTTP 429, HTTP 5xx) are retried with
//! exponential backoff up to [`ResolverConfig::max_retries`] times.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;

use crate::{ResolveError, ResolverConfig};

/// Outcome of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    /// The response carried a `Location` header with this (possibly
    /// relative) target.
    Redirect(String),
    /// The response did not redirect; the probed URL is terminal.
    Terminal,
}

/// Issues a single request against a URL without following redirects.
#[async_trait]
pub trait RedirectProbe: Send + Sync {
    /// Probes `url` once.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the request cannot be completed.
    async fn probe(&self, url: &Url) -> Result<Hop, ResolveError>;
}

/// [`RedirectProbe`] backed by a `reqwest` client with redirects disabled.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    request_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

/// Client settings shared by every probe: no redirect following and a
/// per-request timeout.
#[must_use]
pub fn client_builder(config: &ResolverConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(config.request_timeout)
        .user_agent(concat!("wake-dispatch/", env!("CARGO_PKG_VERSION")))
}

impl HttpProbe {
    /// Builds a probe with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        Ok(Self::with_client(client_builder(config).build()?, config))
    }

    /// Wraps an existing client. The client must not follow redirects.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, config: &ResolverConfig) -> Self {
        Self {
            client,
            request_timeout: config.request_timeout,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        }
    }
}

#[async_trait]
impl RedirectProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<Hop, ResolveError> {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self
                    .retry_backoff
                    .saturating_mul(2u32.saturating_pow(attempt - 1));
                log::warn!(
                    "  retry {attempt}/{} for {url} in {delay:?}...",
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            let can_retry = attempt < self.max_retries;
            attempt += 1;

            let response = match self.client.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    if is_transient(&e) && can_retry {
                        log::warn!("  transient error probing {url}: {e}");
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(ResolveError::Timeout {
                            url: url.to_string(),
                            elapsed: self.request_timeout,
                        });
                    }
                    return Err(ResolveError::Transport(e));
                }
            };

            if let Some(location) = response.headers().get(LOCATION) {
                let location = location.to_str().map_err(|e| ResolveError::InvalidUrl {
                    url: url.to_string(),
                    message: format!("Location header is not valid text: {e}"),
                })?;
                return Ok(Hop::Redirect(location.to_string()));
            }

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if can_retry {
                    log::warn!("  HTTP {status} probing {url}");
                    continue;
                }
                return Err(ResolveError::UpstreamStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            return Ok(Hop::Terminal);
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
