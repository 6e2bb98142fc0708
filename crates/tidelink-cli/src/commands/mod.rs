//! CLI subcommands and the state they share

pub mod auth;
pub mod catalog;
pub mod completions;
pub mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tidelink_client::{ClientConfig, ProviderClient, TokenSet};
use tidelink_core::EmbeddingConfig;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command sees
#[derive(Debug)]
pub struct CommandContext {
    pub format: OutputFormat,
    config_path: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config_path: Option<PathBuf>) -> Self {
        Self {
            format,
            config_path,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format == OutputFormat::Json)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Client settings from `--config`, or from `TIDAL_*` variables.
    pub fn client_config(&self) -> Result<ClientConfig> {
        match &self.config_path {
            Some(path) => {
                debug!(path = %path.display(), "Loading client configuration file");
                ClientConfig::load(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))
            }
            None => {
                let env = EmbeddingConfig::from_env()
                    .context("Client settings missing; set TIDAL_CLIENT_ID and TIDAL_REDIRECT_URI or pass --config")?;
                Ok(env.to_client_config())
            }
        }
    }

    /// A client with no tokens, for the authorization flow.
    pub fn client(&self) -> Result<ProviderClient> {
        Ok(ProviderClient::new(self.client_config()?)?)
    }

    /// A client holding the tokens passed on the command line.
    ///
    /// With only a refresh token, a refresh runs before the first request.
    pub async fn session_client(&self, session: &SessionArgs) -> Result<ProviderClient> {
        let client = self.client()?;

        match (&session.access_token, session.expires_in) {
            (Some(access), Some(ttl)) => {
                client.set_tokens(access.clone(), session.refresh_token.clone(), ttl);
            }
            (Some(access), None) => client.set_token_set(TokenSet {
                access_token: Some(access.clone()),
                refresh_token: session.refresh_token.clone(),
                expires_at: None,
            }),
            (None, _) => {
                if let Some(refresh) = &session.refresh_token {
                    client.set_token_set(TokenSet {
                        access_token: None,
                        refresh_token: Some(refresh.clone()),
                        expires_at: None,
                    });
                    client
                        .refresh_now()
                        .await
                        .context("Failed to obtain an access token")?;
                }
            }
        }

        Ok(client)
    }
}

/// Tokens and locale for catalog commands
#[derive(Debug, Clone, clap::Args)]
pub struct SessionArgs {
    /// Access token from a previous authorization
    #[arg(long, env = "TIDAL_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh token used when the access token is stale or rejected
    #[arg(long, env = "TIDAL_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Seconds until the access token expires, if known
    #[arg(long)]
    pub expires_in: Option<u64>,

    /// Country code for catalog lookups (defaults to the configured one)
    #[arg(long)]
    pub country: Option<String>,
}

impl SessionArgs {
    /// True when `current` no longer matches the tokens passed in.
    pub fn rotated(&self, current: &TokenSet) -> bool {
        current.access_token != self.access_token
            || (current.refresh_token.is_some() && current.refresh_token != self.refresh_token)
    }

    /// Prints the new token pair on stderr when the client rotated it.
    ///
    /// The Provider may invalidate the old refresh token, so the caller
    /// needs the new one to keep the session.
    pub fn report_rotation(&self, client: &ProviderClient, fmt: &dyn OutputFormatter) {
        let current = client.tokens();
        if !self.rotated(&current) {
            return;
        }

        fmt.warn("Tokens were refreshed; the previous pair may no longer be valid");
        if let Some(access) = &current.access_token {
            fmt.hint(&format!("New access token:  {access}"));
        }
        if let Some(refresh) = &current.refresh_token {
            fmt.hint(&format!("New refresh token: {refresh}"));
        }
        if let Some(expires_at) = current.expires_at {
            fmt.hint(&format!("Expires at:        {}", expires_at.to_rfc3339()));
        }
    }
}
