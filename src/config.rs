//! Configuration loading from `.env` files.

use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};

use crate::broadcast::BroadcastConfig;
use crate::keys::Keys;
use crate::profile::ResolverConfig;

/// Every variable [`Settings::from_env`] reads.
pub const ENV_VARS: [&str; 11] = [
    "NOSTR_PRIVATE_KEY",
    "RELAYS",
    "BIND_HTTP",
    "TOR_SOCKS",
    "PUBLISH_CONCURRENCY",
    "PUBLISH_MAX_RETRIES",
    "PUBLISH_BACKOFF_MS",
    "PUBLISH_CONNECT_TIMEOUT_MS",
    "PUBLISH_TIMEOUT_MS",
    "PROFILE_CONNECT_TIMEOUT_MS",
    "PROFILE_QUERY_TIMEOUT_MS",
];

pub const DEFAULT_BIND_HTTP: &str = "127.0.0.1:7777";

/// Relays written into a freshly generated `.env`.
pub const DEFAULT_RELAYS: [&str; 4] = [
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.snort.social",
    "wss://nostr.mom",
];

/// Runtime settings derived from environment variables.
///
/// Built once at startup and handed to each component; nothing reads the
/// environment after that.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Service secret key (`nsec` or hex). Needed only for signing.
    pub private_key: Option<String>,
    /// Default relays merged into every broadcast and used for lookups.
    pub relays: Vec<String>,
    /// HTTP bind address, e.g. `127.0.0.1:7777`.
    pub bind_http: String,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
    pub broadcast: BroadcastConfig,
    pub resolver: ResolverConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            private_key: None,
            relays: vec![],
            bind_http: DEFAULT_BIND_HTTP.into(),
            tor_socks: None,
            broadcast: BroadcastConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from the specified `.env` file.
    ///
    /// Variables already present in the process environment win over the
    /// file. Values containing spaces must be quoted, e.g.
    /// `RELAYS="wss://a, wss://b"`.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).with_context(|| format!("reading env file {path}"))?;
        Self::from_process_env()
    }

    /// Build settings from the current process environment only.
    pub fn from_process_env() -> Result<Self> {
        let defaults = Settings::default();
        let private_key = non_empty("NOSTR_PRIVATE_KEY");
        let relays = csv_strings(env::var("RELAYS").unwrap_or_default());
        let bind_http = non_empty("BIND_HTTP").unwrap_or(defaults.bind_http);
        let tor_socks = non_empty("TOR_SOCKS");

        let broadcast = BroadcastConfig {
            concurrency: parse_or("PUBLISH_CONCURRENCY", defaults.broadcast.concurrency)?,
            max_retries: parse_or("PUBLISH_MAX_RETRIES", defaults.broadcast.max_retries)?,
            initial_backoff: millis_or("PUBLISH_BACKOFF_MS", defaults.broadcast.initial_backoff)?,
            connect_timeout: millis_or(
                "PUBLISH_CONNECT_TIMEOUT_MS",
                defaults.broadcast.connect_timeout,
            )?,
            publish_timeout: millis_or("PUBLISH_TIMEOUT_MS", defaults.broadcast.publish_timeout)?,
        };
        let resolver = ResolverConfig {
            connect_timeout: millis_or(
                "PROFILE_CONNECT_TIMEOUT_MS",
                defaults.resolver.connect_timeout,
            )?,
            query_timeout: millis_or("PROFILE_QUERY_TIMEOUT_MS", defaults.resolver.query_timeout)?,
        };

        Ok(Self {
            private_key,
            relays,
            bind_http,
            tor_socks,
            broadcast,
            resolver,
        })
    }

    /// Parse the configured secret key, if any.
    pub fn keys(&self) -> Result<Option<Keys>> {
        self.private_key
            .as_deref()
            .map(|secret| Keys::parse(secret).context("parsing NOSTR_PRIVATE_KEY"))
            .transpose()
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(name) {
        Some(raw) => raw.parse().with_context(|| format!("parsing {name}={raw}")),
        None => Ok(default),
    }
}

fn millis_or(name: &str, default: Duration) -> Result<Duration> {
    match non_empty(name) {
        Some(_) => parse_or::<u64>(name, 0).map(Duration::from_millis),
        None => Ok(default),
    }
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
