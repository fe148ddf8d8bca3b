//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ANN_API_URL` - Base URL of the product catalog REST API
//! - `COGNITO_USER_POOL_ID` - Cognito user pool id (e.g., us-east-1_AbCdEf123)
//! - `COGNITO_CLIENT_ID` - Cognito app client id (public client, no secret)
//!
//! ## Optional
//! - `COGNITO_REGION` - AWS region (default: the user pool id prefix)
//! - `COGNITO_ENDPOINT` - Override for the Cognito IdP endpoint
//! - `ANN_SESSION_FILE` - Durable session storage file (default: .ann-traders/session.json)
//! - `ANN_HTTP_TIMEOUT_SECS` - HTTP request timeout (default: 30)
//! - `ANN_CATALOG_CACHE_TTL_SECS` - Catalog response cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_SESSION_FILE: &str = ".ann-traders/session.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Catalog REST API base URL (no trailing slash)
    pub api_url: String,
    /// Cognito identity provider configuration
    pub cognito: CognitoConfig,
    /// File backing the durable session storage
    pub session_file: PathBuf,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
    /// How long catalog responses are cached
    pub catalog_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Cognito user pool configuration.
#[derive(Debug, Clone)]
pub struct CognitoConfig {
    /// AWS region hosting the user pool
    pub region: String,
    /// User pool id
    pub user_pool_id: String,
    /// App client id
    pub client_id: String,
    /// Cognito IdP JSON API endpoint
    pub endpoint: String,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_url = validated_url(&env.required("ANN_API_URL")?, "ANN_API_URL")?;
        let cognito = CognitoConfig::from_env(&env)?;
        let session_file = PathBuf::from(env.or_default("ANN_SESSION_FILE", DEFAULT_SESSION_FILE));
        let http_timeout = env.seconds("ANN_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        let catalog_cache_ttl = env.seconds("ANN_CATALOG_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?;

        Ok(Self {
            api_url,
            cognito,
            session_file,
            http_timeout,
            catalog_cache_ttl,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

impl CognitoConfig {
    fn from_env<F>(env: &Env<F>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user_pool_id = env.required("COGNITO_USER_POOL_ID")?;
        let client_id = env.required("COGNITO_CLIENT_ID")?;

        let region = match env.optional("COGNITO_REGION") {
            Some(region) => region,
            None => region_from_pool_id(&user_pool_id).ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "COGNITO_USER_POOL_ID".to_string(),
                    "expected <region>_<id>; set COGNITO_REGION explicitly".to_string(),
                )
            })?,
        };

        let endpoint = match env.optional("COGNITO_ENDPOINT") {
            Some(endpoint) => validated_url(&endpoint, "COGNITO_ENDPOINT")?,
            None => format!("https://cognito-idp.{region}.amazonaws.com"),
        };

        Ok(Self {
            region,
            user_pool_id,
            client_id,
            endpoint,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get a non-empty variable, or `None`.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn seconds(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        self.optional(key).map_or(Ok(Duration::from_secs(default)), |value| {
            value
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

/// Validate an absolute http(s) URL and strip any trailing slash.
fn validated_url(value: &str, var_name: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// `us-east-1_AbCdEf123` -> `us-east-1`.
fn region_from_pool_id(user_pool_id: &str) -> Option<String> {
    user_pool_id
        .split_once('_')
        .map(|(region, _)| region)
        .filter(|region| !region.is_empty())
        .map(str::to_string)
}
