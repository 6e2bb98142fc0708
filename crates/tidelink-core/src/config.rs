//! Configuration module for tidelink.
//!
//! Provides the typed [`ClientConfig`] consumed by the Provider client, with
//! YAML loading, validation, defaults, and builder-style overrides, plus the
//! environment-driven [`EmbeddingConfig`] read by embedding applications.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default authorization server base (authorize and token endpoints live under it).
pub const DEFAULT_AUTH_BASE_URL: &str = "https://auth.tidal.com/v1/oauth2";

/// Default catalog API base.
pub const DEFAULT_API_BASE_URL: &str = "https://openapi.tidal.com";

/// Country code used when neither the caller nor the environment supplies one.
pub const DEFAULT_COUNTRY_CODE: &str = "US";

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &["r_usr", "w_usr"];

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// How the client authenticates itself at the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// Public client: `client_id` travels in the form body, PKCE protects the code.
    #[default]
    Pkce,
    /// Confidential client: HTTP Basic `client_id:client_secret`.
    ClientSecretBasic,
}

/// Immutable configuration for one Provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// OAuth client identifier registered with the Provider.
    pub client_id: String,
    /// Client secret, required for [`ClientAuthMethod::ClientSecretBasic`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_auth: ClientAuthMethod,
    /// Redirect URI registered with the Provider.
    pub redirect_uri: String,
    /// Scopes requested in the authorize URL.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Country code applied by catalog methods when the caller gives none.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    /// Window before expiry in which the access token is treated as stale.
    #[serde(
        rename = "refresh_skew_ms",
        with = "duration_ms",
        default = "default_refresh_skew"
    )]
    pub refresh_skew: Duration,
    /// Retries allowed after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-attempt timeout when the caller gives none.
    #[serde(
        rename = "base_timeout_ms",
        with = "duration_ms",
        default = "default_base_timeout"
    )]
    pub base_timeout: Duration,
    #[serde(
        rename = "base_backoff_ms",
        with = "duration_ms",
        default = "default_base_backoff"
    )]
    pub base_backoff: Duration,
    #[serde(
        rename = "max_backoff_ms",
        with = "duration_ms",
        default = "default_max_backoff"
    )]
    pub max_backoff: Duration,
    /// Upper bound of the uniform jitter added to each backoff.
    #[serde(
        rename = "max_jitter_ms",
        with = "duration_ms",
        default = "default_max_jitter"
    )]
    pub max_jitter: Duration,
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

fn default_refresh_skew() -> Duration {
    Duration::from_secs(300)
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_base_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_max_jitter() -> Duration {
    Duration::from_secs(1)
}

fn default_auth_base_url() -> String {
    DEFAULT_AUTH_BASE_URL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl ClientConfig {
    /// Creates a public PKCE client configuration with default tuning.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            client_auth: ClientAuthMethod::Pkce,
            redirect_uri: redirect_uri.into(),
            scopes: default_scopes(),
            default_country_code: default_country_code(),
            refresh_skew: default_refresh_skew(),
            max_retries: default_max_retries(),
            base_timeout: default_base_timeout(),
            base_backoff: default_base_backoff(),
            max_backoff: default_max_backoff(),
            max_jitter: default_max_jitter(),
            auth_base_url: default_auth_base_url(),
            api_base_url: default_api_base_url(),
        }
    }

    /// Sets the client secret and switches to HTTP Basic client authentication.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self.client_auth = ClientAuthMethod::ClientSecretBasic;
        self
    }

    pub fn with_client_auth(mut self, method: ClientAuthMethod) -> Self {
        self.client_auth = method;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_default_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.default_country_code = country_code.into();
        self
    }

    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Sets the exponential backoff base and cap.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    pub fn with_auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = url.into();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Space-joined scope list, or `None` if no scopes are configured.
    pub fn scope_string(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }

    /// Token endpoint URL derived from `auth_base_url`.
    pub fn token_url(&self) -> String {
        format!("{}/token", self.auth_base_url.trim_end_matches('/'))
    }

    /// Authorize endpoint URL derived from `auth_base_url`.
    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_base_url.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ClientConfig {
    /// Load configuration from a YAML file at `path`.
    ///
    /// Only `client_id` and `redirect_uri` are required; everything else
    /// falls back to its default.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tidelink/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tidelink")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending field, e.g. `"redirect_uri"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        Ok(parsed) => errors.push(ValidationError {
            field: field.into(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field: field.into(),
            message: format!("invalid URL '{value}': {e}"),
        }),
    }
}

impl ClientConfig {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.client_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "client_id".into(),
                message: "must not be empty".into(),
            });
        }

        if self.client_auth == ClientAuthMethod::ClientSecretBasic
            && self
                .client_secret
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            errors.push(ValidationError {
                field: "client_secret".into(),
                message: "required when client_auth is client_secret_basic".into(),
            });
        }

        // Redirect URIs may use custom schemes for native apps, so only parse.
        if let Err(e) = url::Url::parse(&self.redirect_uri) {
            errors.push(ValidationError {
                field: "redirect_uri".into(),
                message: format!("invalid URL '{}': {e}", self.redirect_uri),
            });
        }

        check_url(&mut errors, "auth_base_url", &self.auth_base_url);
        check_url(&mut errors, "api_base_url", &self.api_base_url);

        if self.default_country_code.len() != 2
            || !self
                .default_country_code
                .chars()
                .all(|c| c.is_ascii_alphabetic())
        {
            errors.push(ValidationError {
                field: "default_country_code".into(),
                message: format!(
                    "expected a two-letter country code, got '{}'",
                    self.default_country_code
                ),
            });
        }

        if self.base_timeout.is_zero() {
            errors.push(ValidationError {
                field: "base_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.base_backoff > self.max_backoff {
            errors.push(ValidationError {
                field: "base_backoff_ms".into(),
                message: format!(
                    "base_backoff ({}ms) must not exceed max_backoff ({}ms)",
                    self.base_backoff.as_millis(),
                    self.max_backoff.as_millis()
                ),
            });
        }

        errors
    }

    /// Validate and return `self`, or the list of problems.
    pub fn validated(self) -> Result<Self, Vec<ValidationError>> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVariable(&'static str),

    #[error("environment variable {0} is set but empty")]
    EmptyVariable(&'static str),
}

/// Settings an embedding application reads from its environment.
///
/// Variables: `TIDAL_CLIENT_ID`, `TIDAL_CLIENT_SECRET`, `TIDAL_REDIRECT_URI`,
/// `TIDAL_SCOPES`, `TIDAL_PLAYLIST_ID`, and `TIDAL_COUNTRY_CODE` (falling back
/// to `DEFAULT_COUNTRY`, then `"US"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Playlist the embedding shows when none is requested.
    pub playlist_id: Option<String>,
    pub country_code: String,
}

impl EmbeddingConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads variables through `lookup`, which returns `None` for unset names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| match lookup(name) {
            None => Err(ConfigError::MissingVariable(name)),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyVariable(name)),
            Some(v) => Ok(v.trim().to_string()),
        };

        let client_id = required("TIDAL_CLIENT_ID")?;
        let redirect_uri = required("TIDAL_REDIRECT_URI")?;
        let scopes = optional("TIDAL_SCOPES")
            .map(|raw| parse_scopes(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_scopes);
        let country_code = optional("TIDAL_COUNTRY_CODE")
            .or_else(|| optional("DEFAULT_COUNTRY"))
            .unwrap_or_else(default_country_code);

        Ok(Self {
            client_id,
            client_secret: optional("TIDAL_CLIENT_SECRET"),
            redirect_uri,
            scopes,
            playlist_id: optional("TIDAL_PLAYLIST_ID"),
            country_code,
        })
    }

    /// Converts into a client configuration.
    ///
    /// A configured secret selects HTTP Basic client authentication.
    pub fn to_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.client_id, &self.redirect_uri)
            .with_scopes(self.scopes.clone())
            .with_default_country_code(&self.country_code);
        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret);
        }
        config
    }
}

/// Splits a scope list separated by whitespace, `+` or `,`.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == '+' || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
