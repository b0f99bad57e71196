#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map link resolution.
//!
//! Dispatch messages carry shortened map links (`https://t.co/...`) that
//! redirect, possibly several times, to a map URL whose single query
//! parameter holds `"<lat>,<lon>"`. [`CoordinateResolver`] walks that chain
//! one hop at a time with an explicit hop limit and an overall deadline,
//! then reads the coordinate from the terminal URL.

pub mod probe;

use std::time::{Duration, Instant};

use reqwest::Url;
use wake_dispatch_models::Coordinate;

pub use probe::{HttpProbe, Hop, RedirectProbe};

/// Errors that can occur while resolving a map link.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// HTTP request failed.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream kept failing with a retryable status.
    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus {
        /// URL that was probed.
        url: String,
        /// Final HTTP status.
        status: u16,
    },

    /// The redirect chain was longer than the configured hop limit.
    #[error("Redirect loop: more than {max_hops} redirects starting at {url}")]
    RedirectLoop {
        /// URL the chain started at.
        url: String,
        /// Configured hop limit.
        max_hops: usize,
    },

    /// Resolution did not finish in time.
    #[error("Timed out resolving {url} after {elapsed:?}")]
    Timeout {
        /// URL being resolved.
        url: String,
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The terminal URL does not carry a usable coordinate.
    #[error("Coordinate format error in {url}: {message}")]
    CoordinateFormat {
        /// Terminal URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A URL or redirect target could not be parsed.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Description of what went wrong.
        message: String,
    },
}

/// Limits applied while resolving a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum number of redirects followed before giving up.
    pub max_hops: usize,
    /// Timeout for each individual HTTP request.
    pub request_timeout: Duration,
    /// Deadline for the whole redirect chain, retries included.
    pub total_timeout: Duration,
    /// Retries per hop for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub retry_backoff: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hops: 10,
            request_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Resolves shortened map links to coordinates.
///
/// Holds no per-link state, so one resolver can serve any number of
/// concurrent resolutions.
#[derive(Debug, Clone)]
pub struct CoordinateResolver<P = HttpProbe> {
    probe: P,
    config: ResolverConfig,
}

impl CoordinateResolver<HttpProbe> {
    /// Creates a resolver that probes over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        Ok(Self::with_probe(HttpProbe::new(&config)?, config))
    }
}

impl<P: RedirectProbe> CoordinateResolver<P> {
    /// Creates a resolver around an arbitrary probe.
    #[must_use]
    pub const fn with_probe(probe: P, config: ResolverConfig) -> Self {
        Self { probe, config }
    }

    /// The limits this resolver applies.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Follows `url`'s redirect chain and reads the coordinate from the
    /// terminal URL.
    ///
    /// # Errors
    ///
    /// * [`ResolveError::RedirectLoop`] if the chain exceeds the hop limit.
    /// * [`ResolveError::Timeout`] if the chain does not finish before the
    ///   total deadline.
    /// * [`ResolveError::CoordinateFormat`] if the terminal URL has no
    ///   parseable `"<lat>,<lon>"` query value.
    /// * [`ResolveError::Transport`] / [`ResolveError::UpstreamStatus`] for
    ///   network failures that survive retries.
    pub async fn resolve(&self, url: &str) -> Result<Coordinate, ResolveError> {
        let started = Instant::now();
        match tokio::time::timeout(self.config.total_timeout, self.follow(url)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout {
                url: url.to_string(),
                elapsed: started.elapsed(),
            }),
        }
    }

    async fn follow(&self, start: &str) -> Result<Coordinate, ResolveError> {
        let mut current = Url::parse(start).map_err(|e| ResolveError::InvalidUrl {
            url: start.to_string(),
            message: e.to_string(),
        })?;

        for hop in 0..=self.config.max_hops {
            match self.probe.probe(&current).await? {
                Hop::Terminal => {
                    log::trace!("Resolved {start} after {hop} redirect(s) at {current}");
                    return coordinate_from_url(&current);
                }
                Hop::Redirect(location) => {
                    log::trace!("Hop {}: {current} -> {location}", hop + 1);
                    current = current
                        .join(&location)
                        .map_err(|e| ResolveError::InvalidUrl {
                            url: location.clone(),
                            message: e.to_string(),
                        })?;
                }
            }
        }

        Err(ResolveError::RedirectLoop {
            url: start.to_string(),
            max_hops: self.config.max_hops,
        })
    }
}

/// Reads `"<lat>,<lon>"` from the value of `url`'s first query parameter.
///
/// # Errors
///
/// Returns [`ResolveError::CoordinateFormat`] if the query string is
/// missing or its value is not two comma-separated finite numbers.
pub fn coordinate_from_url(url: &Url) -> Result<Coordinate, ResolveError> {
    let format_error = |message: &str| ResolveError::CoordinateFormat {
        url: url.to_string(),
        message: message.to_string(),
    };

    let (_, value) = url
        .query_pairs()
        .next()
        .ok_or_else(|| format_error("missing query string"))?;

    let mut parts = value.split(',').map(|part| part.trim().parse::<f64>());
    let (Some(Ok(lat)), Some(Ok(lon))) = (parts.next(), parts.next()) else {
        return Err(format_error(&format!(
            "expected '<lat>,<lon>', found '{value}'"
        )));
    };

    if !lat.is_finite() || !lon.is_finite() {
        return Err(format_error(&format!("non-finite coordinate '{value}'")));
    }

    Ok(Coordinate { lat, lon })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;

    /// Answers probes from a fixed table; unknown URLs are terminal.
    struct TableProbe {
        redirects: BTreeMap<String, String>,
        delay: Option<Duration>,
    }

    impl TableProbe {
        fn chain(urls: &[&str]) -> Self {
            let redirects = urls
                .windows(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect();
            Self {
                redirects,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl RedirectProbe for TableProbe {
        async fn probe(&self, url: &Url) -> Result<Hop, ResolveError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self
                .redirects
                .get(url.as_str())
                .map_or(Hop::Terminal, |next| Hop::Redirect(next.clone())))
        }
    }

    fn chain_of(n: usize, terminal: &str) -> Vec<String> {
        let mut urls: Vec<String> = (0..n).map(|i| format!("https://t.co/hop{i}")).collect();
        urls.push(terminal.to_string());
        urls
    }

    fn resolver_for(urls: &[String], max_hops: usize) -> CoordinateResolver<TableProbe> {
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        CoordinateResolver::with_probe(
            TableProbe::chain(&refs),
            ResolverConfig {
                max_hops,
                ..ResolverConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn resolves_chain_within_hop_limit() {
        for n in [0, 1, 3, 10] {
            let urls = chain_of(n, "https://maps.google.com/?q=35.7,-78.6");
            let coordinate = resolver_for(&urls, 10).resolve(&urls[0]).await.unwrap();
            assert!((coordinate.lat - 35.7).abs() < 1e-9, "chain of {n}");
            assert!((coordinate.lon - -78.6).abs() < 1e-9, "chain of {n}");
        }
    }

    #[tokio::test]
    async fn fails_when_chain_exceeds_hop_limit() {
        let urls = chain_of(11, "https://maps.google.com/?q=35.7,-78.6");
        let err = resolver_for(&urls, 10).resolve(&urls[0]).await.unwrap_err();
        assert!(matches!(err, ResolveError::RedirectLoop { max_hops: 10, .. }));
    }

    #[tokio::test]
    async fn detects_cyclic_redirects() {
        let probe = TableProbe {
            redirects: BTreeMap::from([
                ("https://t.co/a".to_string(), "https://t.co/b".to_string()),
                ("https://t.co/b".to_string(), "https://t.co/a".to_string()),
            ]),
            delay: None,
        };
        let resolver = CoordinateResolver::with_probe(probe, ResolverConfig::default());
        let err = resolver.resolve("https://t.co/a").await.unwrap_err();
        assert!(matches!(err, ResolveError::RedirectLoop { .. }));
    }

    #[tokio::test]
    async fn follows_relative_redirects() {
        let probe = TableProbe {
            redirects: BTreeMap::from([(
                "https://goo.gl/maps/abc".to_string(),
                "/maps?ll=35.9,-78.8".to_string(),
            )]),
            delay: None,
        };
        let resolver = CoordinateResolver::with_probe(probe, ResolverConfig::default());
        let coordinate = resolver.resolve("https://goo.gl/maps/abc").await.unwrap();
        assert!((coordinate.lat - 35.9).abs() < 1e-9);
        assert!((coordinate.lon - -78.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn times_out_slow_chains() {
        let urls = chain_of(3, "https://maps.google.com/?q=35.7,-78.6");
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let mut probe = TableProbe::chain(&refs);
        probe.delay = Some(Duration::from_millis(200));
        let resolver = CoordinateResolver::with_probe(
            probe,
            ResolverConfig {
                total_timeout: Duration::from_millis(50),
                ..ResolverConfig::default()
            },
        );
        let err = resolver.resolve(&urls[0]).await.unwrap_err();
        assert!(matches!(err, ResolveError::Timeout { .. }));
    }

    #[tokio::test]
    async fn rejects_unparseable_start_url() {
        let resolver = resolver_for(&[], 10);
        let err = resolver.resolve("not a url").await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidUrl { .. }));
    }

    #[test]
    fn reads_coordinate_from_query() {
        let url = Url::parse("https://maps.google.com/maps?q=35.7791,-78.6382").unwrap();
        let coordinate = coordinate_from_url(&url).unwrap();
        assert!((coordinate.lat - 35.7791).abs() < 1e-9);
        assert!((coordinate.lon - -78.6382).abs() < 1e-9);
    }

    #[test]
    fn reads_percent_encoded_comma() {
        let url = Url::parse("https://maps.google.com/?q=35.7%2C-78.6").unwrap();
        let coordinate = coordinate_from_url(&url).unwrap();
        assert!((coordinate.lat - 35.7).abs() < 1e-9);
    }

    #[test]
    fn rejects_missing_query() {
        let url = Url::parse("https://maps.google.com/place").unwrap();
        let err = coordinate_from_url(&url).unwrap_err();
        assert!(matches!(err, ResolveError::CoordinateFormat { ref message, .. } if message == "missing query string"));
    }

    #[test]
    fn rejects_malformed_coordinates() {
        for query in ["q=35.7", "q=north,south", "q=", "q=35.7;-78.6", "q=NaN,1"] {
            let url = Url::parse(&format!("https://maps.google.com/?{query}")).unwrap();
            assert!(
                matches!(
                    coordinate_from_url(&url),
                    Err(ResolveError::CoordinateFormat { .. })
                ),
                "{query}"
            );
        }
    }
}
