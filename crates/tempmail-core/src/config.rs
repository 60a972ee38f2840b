//! Static client configuration.
//!
//! There is no runtime override mechanism: production values come from
//! [`Config::default`], tests build their own value with struct update syntax.

use std::time::Duration;

use crate::i18n::Locale;

/// Default endpoint of the disposable mail API.
pub const DEFAULT_API_BASE: &str = "https://api.guerrillamail.com/ajax.php";

/// Default delay before a failed address generation is retried.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default auto-refresh cadence in seconds.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Longest accepted auto-refresh cadence in seconds (one day).
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 86_400;

/// How long a notice stays visible before the presenter dismisses it.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(3);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Domains the service accepts for new addresses.
const DEFAULT_DOMAINS: &[&str] = &[
    "guerrillamail.com",
    "guerrillamail.net",
    "guerrillamail.org",
    "guerrillamailblock.com",
    "sharklasers.com",
    "grr.la",
    "pokemail.net",
    "spam4.me",
];

/// Names of the keys used in the key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Current email address.
    pub email: String,
    /// Server-issued session identifier.
    pub session: String,
    /// Auto-refresh enabled flag (`"true"`/`"false"`).
    pub auto_refresh: String,
    /// Auto-refresh interval in seconds.
    pub refresh_interval: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            email: "tempmail_email".to_string(),
            session: "tempmail_session".to_string(),
            auto_refresh: "tempmail_auto_refresh".to_string(),
            refresh_interval: "tempmail_refresh_interval".to_string(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Full URL of the API endpoint; operations are selected with `?f=`.
    pub api_base: String,
    /// Candidate domains for generated addresses.
    pub domains: Vec<String>,
    /// Delay before a failed generation is retried.
    pub retry_delay: Duration,
    /// Storage key names.
    pub keys: StorageKeys,
    /// Interval used when no preference has been persisted.
    pub default_refresh_interval_secs: u64,
    /// Lifetime of transient notices.
    pub notice_ttl: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Language of user-facing text.
    pub locale: Locale,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            domains: DEFAULT_DOMAINS.iter().map(|d| (*d).to_string()).collect(),
            retry_delay: DEFAULT_RETRY_DELAY,
            keys: StorageKeys::default(),
            default_refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            notice_ttl: DEFAULT_NOTICE_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            locale: Locale::default(),
        }
    }
}

impl Config {
    /// Returns the default configuration with the given locale.
    #[must_use]
    pub fn with_locale(locale: Locale) -> Self {
        Self {
            locale,
            ..Self::default()
        }
    }
}
