//! Service settings: embedded TOML defaults plus environment overrides.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use wake_dispatch_ingest::StreamConfig;
use wake_dispatch_resolver::ResolverConfig;
use wake_dispatch_server::ServerConfig;
use wake_dispatch_store::StoreConfig;

const DEFAULTS: &str = include_str!("../config/wake_county.toml");

/// Errors that can occur while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The embedded defaults are not valid TOML.
    #[error("Invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {name}: '{value}' ({message})")]
    InvalidValue {
        /// Environment variable name.
        name: String,
        /// The rejected value.
        value: String,
        /// Description of what went wrong.
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    /// Prefix of every collection title.
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// `CouchDB` URL; empty keeps dispatches in memory.
    #[serde(default)]
    pub url: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    /// Streaming endpoint; empty reads from stdin.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub follow: Option<String>,
    /// Account the dispatches are posted from.
    pub source_handle: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverSettings {
    pub max_hops: usize,
    pub request_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Everything the service needs to start.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub collection: CollectionSettings,
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub feed: FeedSettings,
    pub resolver: ResolverSettings,
}

/// Parses `value` of variable `name`, naming both on failure.
fn parse_var<T>(name: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| SettingsError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            message: e.to_string(),
        })
}

/// Treats empty strings as unset.
fn non_empty(value: String) -> Option<String> {
    Some(value).filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// The defaults compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Toml`] if the embedded file is malformed.
    pub fn embedded() -> Result<Self, SettingsError> {
        Ok(toml::de::from_str(DEFAULTS)?)
    }

    /// Embedded defaults with overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the defaults are malformed or an
    /// override cannot be parsed.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::embedded()?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Applies overrides found through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] if a numeric override cannot
    /// be parsed.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(url) = lookup("COUCHDB_URL") {
            self.store.url = url;
        }
        if let Some(database) = lookup("COUCHDB_DATABASE").and_then(non_empty) {
            self.store.database = database;
        }
        if let Some(host) = lookup("HOST").and_then(non_empty) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_var("PORT", &port)?;
        }
        if let Some(url) = lookup("FEED_URL") {
            self.feed.url = url;
        }
        if let Some(token) = lookup("FEED_BEARER_TOKEN") {
            self.feed.bearer_token = non_empty(token);
        }
        if let Some(follow) = lookup("FEED_FOLLOW") {
            self.feed.follow = non_empty(follow);
        }
        if let Some(hops) = lookup("RESOLVER_MAX_HOPS") {
            self.resolver.max_hops = parse_var("RESOLVER_MAX_HOPS", &hops)?;
        }
        if let Some(secs) = lookup("RESOLVER_TIMEOUT_SECS") {
            self.resolver.request_timeout_secs = parse_var("RESOLVER_TIMEOUT_SECS", &secs)?;
        }
        if let Some(retries) = lookup("RESOLVER_MAX_RETRIES") {
            self.resolver.max_retries = parse_var("RESOLVER_MAX_RETRIES", &retries)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            url: self.store.url.clone(),
            database: self.store.database.clone(),
        }
    }

    #[must_use]
    pub const fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_hops: self.resolver.max_hops,
            request_timeout: Duration::from_secs(self.resolver.request_timeout_secs),
            total_timeout: Duration::from_secs(self.resolver.total_timeout_secs),
            max_retries: self.resolver.max_retries,
            retry_backoff: Duration::from_millis(self.resolver.retry_backoff_ms),
        }
    }

    /// Stream settings, or `None` when no feed URL is configured.
    #[must_use]
    pub fn stream_config(&self) -> Option<StreamConfig> {
        non_empty(self.feed.url.clone()).map(|url| StreamConfig {
            url,
            bearer_token: self.feed.bearer_token.clone(),
            follow: self.feed.follow.clone(),
        })
    }

    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn with_env(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = Settings::embedded()?;
        settings.apply_env(|name| vars.get(name).cloned())?;
        Ok(settings)
    }

    #[test]
    fn embedded_defaults_parse() {
        let settings = Settings::embedded().unwrap();
        assert_eq!(settings.collection.title, "All Wake County dispatches");
        assert_eq!(settings.store.database, "wakedispatch");
        assert!(!settings.store_config().has_credentials());
        assert!(settings.stream_config().is_none());
        assert_eq!(settings.resolver_config(), ResolverConfig::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = with_env(&[
            ("COUCHDB_URL", "https://user:pw@example.com:443"),
            ("COUCHDB_DATABASE", "dispatch_test"),
            ("HOST", "0.0.0.0"),
            ("PORT", "5000"),
            ("FEED_URL", "https://stream.example.com/statuses"),
            ("FEED_BEARER_TOKEN", "secret"),
            ("FEED_FOLLOW", "12345"),
            ("RESOLVER_MAX_HOPS", "4"),
            ("RESOLVER_TIMEOUT_SECS", "3"),
            ("RESOLVER_MAX_RETRIES", "0"),
        ])
        .unwrap();

        assert!(settings.store_config().has_credentials());
        assert_eq!(settings.store.database, "dispatch_test");
        assert_eq!(
            settings.server_config(),
            ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000
            }
        );

        let stream = settings.stream_config().unwrap();
        assert_eq!(stream.bearer_token.as_deref(), Some("secret"));
        assert_eq!(stream.follow.as_deref(), Some("12345"));

        let resolver = settings.resolver_config();
        assert_eq!(resolver.max_hops, 4);
        assert_eq!(resolver.request_timeout, Duration::from_secs(3));
        assert_eq!(resolver.max_retries, 0);
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let settings = with_env(&[("COUCHDB_DATABASE", ""), ("FEED_BEARER_TOKEN", " ")]).unwrap();
        assert_eq!(settings.store.database, "wakedispatch");
        assert!(settings.feed.bearer_token.is_none());
    }

    #[test]
    fn unparseable_numbers_are_errors() {
        let err = with_env(&[("PORT", "http")]).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { ref name, .. } if name == "PORT"));

        assert!(with_env(&[("RESOLVER_MAX_HOPS", "-1")]).is_err());
    }
}
