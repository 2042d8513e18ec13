//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Server
//! - `SHOPLIST_HOST` - Bind address (default: 127.0.0.1)
//! - `SHOPLIST_PORT` - Listen port (default: 3000)
//!
//! ## Document store
//! - `SHOPLIST_STORE` - `memory` or `firestore` (default: memory)
//! - `SHOPLIST_DATA_FILE` - JSON file persisting the memory store
//! - `FIRESTORE_PROJECT_ID` - Firestore project (required for firestore)
//! - `FIRESTORE_API_KEY` - Firestore API key (required for firestore, high entropy)
//! - `FIRESTORE_DATABASE` - Database id (default: `(default)`)
//! - `FIRESTORE_ENDPOINT` - REST base URL (default: <https://firestore.googleapis.com/v1>)
//! - `FIRESTORE_POLL_INTERVAL_MS` - Subscription polling interval (default: 2000)
//!
//! ## Behaviour
//! - `SHOPLIST_CURRENCY` - Display currency (default: BRL)
//! - `SHOPLIST_PRICE_RULE` - `strict` or `lower-or-equal` (default: strict)
//! - `SHOPLIST_MARKET_CACHE_TTL_SECS` - Market list cache TTL (default: 30)
//!
//! ## Error tracking
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use shoplist_core::{CurrencyCode, PriceRule};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct ShoplistConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Document store backend
    pub store: StoreConfig,
    /// Currency prices are displayed in
    pub currency: CurrencyCode,
    /// When a purchase replaces the best price
    pub price_rule: PriceRule,
    /// How long the market list is cached
    pub market_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Document store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// In-process store, optionally persisted to a JSON file.
    Memory { data_file: Option<PathBuf> },
    /// Cloud Firestore over REST.
    Firestore(FirestoreConfig),
}

/// Firestore connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database id, `(default)` unless the project has several.
    pub database: String,
    pub api_key: SecretString,
    /// REST base URL, overridable to point at the emulator.
    pub endpoint: String,
    pub poll_interval: Duration,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl PartialEq for FirestoreConfig {
    fn eq(&self, other: &Self) -> bool {
        use secrecy::ExposeSecret;

        self.project_id == other.project_id
            && self.database == other.database
            && self.api_key.expose_secret() == other.api_key.expose_secret()
            && self.endpoint == other.endpoint
            && self.poll_interval == other.poll_interval
    }
}

impl Eq for FirestoreConfig {}

impl ShoplistConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default::<IpAddr>("SHOPLIST_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("SHOPLIST_PORT", "3000")?;
        let store = StoreConfig::from_env()?;
        let currency = parse_env_or_default::<CurrencyCode>("SHOPLIST_CURRENCY", "BRL")?;
        let price_rule = parse_env_or_default::<PriceRule>("SHOPLIST_PRICE_RULE", "strict")?;
        let market_cache_ttl = Duration::from_secs(parse_env_or_default::<u64>(
            "SHOPLIST_MARKET_CACHE_TTL_SECS",
            "30",
        )?);

        Ok(Self {
            host,
            port,
            store,
            currency,
            price_rule,
            market_cache_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default::<f32>(
                "SENTRY_TRACES_SAMPLE_RATE",
                "0.0",
            )?,
        })
    }

    /// Configuration for local runs and tests: memory store, defaults elsewhere.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            store: StoreConfig::Memory { data_file: None },
            currency: CurrencyCode::default(),
            price_rule: PriceRule::default(),
            market_cache_ttl: Duration::from_secs(30),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StoreConfig {
    /// Load the store selection from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown backend name or invalid Firestore
    /// settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        match get_env_or_default("SHOPLIST_STORE", "memory")
            .to_lowercase()
            .as_str()
        {
            "memory" => Ok(Self::Memory {
                data_file: get_optional_env("SHOPLIST_DATA_FILE").map(PathBuf::from),
            }),
            "firestore" => Ok(Self::Firestore(FirestoreConfig::from_env()?)),
            other => Err(ConfigError::InvalidEnvVar(
                "SHOPLIST_STORE".to_string(),
                format!("unknown store '{other}', expected 'memory' or 'firestore'"),
            )),
        }
    }
}

impl FirestoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let endpoint = get_env_or_default("FIRESTORE_ENDPOINT", DEFAULT_FIRESTORE_ENDPOINT);
        Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidEnvVar("FIRESTORE_ENDPOINT".to_string(), e.to_string())
        })?;

        Ok(Self {
            project_id: get_required_env("FIRESTORE_PROJECT_ID")?,
            database: get_env_or_default("FIRESTORE_DATABASE", "(default)"),
            api_key: get_validated_secret("FIRESTORE_API_KEY")?,
            endpoint,
            poll_interval: Duration::from_millis(parse_env_or_default::<u64>(
                "FIRESTORE_POLL_INTERVAL_MS",
                "2000",
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys are random; low entropy means a typed-in value
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the console."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "FIRESTORE_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_api_key_shape() {
        let result = validate_secret_strength("AIzaSyD3kF9qLm2Xv7Rt8Bw1Yc4Hn6Jp0Uz5Ge", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = ShoplistConfig::in_memory();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = ShoplistConfig::in_memory();
        assert_eq!(config.store, StoreConfig::Memory { data_file: None });
        assert_eq!(config.price_rule, PriceRule::Strict);
        assert_eq!(config.currency, CurrencyCode::BRL);
    }

    #[test]
    fn test_firestore_config_debug_redacts_key() {
        let config = FirestoreConfig {
            project_id: "household-list".to_string(),
            database: "(default)".to_string(),
            api_key: SecretString::from("AIzaSuperSensitiveKeyValue123"),
            endpoint: DEFAULT_FIRESTORE_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(2),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("household-list"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AIzaSuperSensitiveKeyValue123"));
    }
}
