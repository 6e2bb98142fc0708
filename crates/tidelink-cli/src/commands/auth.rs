//! Auth commands - manual OAuth2 authorization-code flow
//!
//! Provides the `tidelink auth` CLI subcommands which:
//! 1. `url`      - Generates state and a PKCE pair and prints the consent URL.
//! 2. `exchange` - Trades the code from the redirect for tokens.
//! 3. `refresh`  - Runs a refresh-token grant and prints the new tokens.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;
use tidelink_client::{new_state, ClientAuthMethod, PkcePair, TokenSet};
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormatter;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Print the URL the user opens to grant access
    Url,
    /// Exchange an authorization code for tokens
    Exchange {
        /// The `code` query parameter from the redirect
        #[arg(long)]
        code: String,
        /// PKCE verifier printed by `tidelink auth url`
        #[arg(long)]
        verifier: Option<String>,
    },
    /// Obtain a new access token with a refresh token
    Refresh {
        #[arg(long, env = "TIDAL_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        match self {
            AuthCommand::Url => self.execute_url(ctx, &*fmt),
            AuthCommand::Exchange { code, verifier } => {
                self.execute_exchange(ctx, &*fmt, code, verifier.as_deref())
                    .await
            }
            AuthCommand::Refresh { refresh_token } => {
                self.execute_refresh(ctx, &*fmt, refresh_token).await
            }
        }
    }

    fn execute_url(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter) -> Result<()> {
        let client = ctx.client()?;
        let state = new_state();

        let pkce = PkcePair::generate();
        let url = client
            .authorization_url(&state, Some(&pkce.challenge))
            .context("Failed to build authorization URL")?;

        info!(
            client_id = %client.config().client_id,
            confidential = client.config().client_auth == ClientAuthMethod::ClientSecretBasic,
            "Generated authorization URL"
        );

        if ctx.is_json() {
            fmt.print_json(&json!({
                "url": url,
                "state": state,
                "code_verifier": pkce.verifier,
            }));
            return Ok(());
        }

        fmt.success("Open this URL to authorize tidelink:");
        println!("{url}");
        fmt.info(&format!("State:    {state}"));
        fmt.info(&format!("Verifier: {}", pkce.verifier));
        fmt.info("Then run: tidelink auth exchange --code <code> --verifier <verifier>");
        Ok(())
    }

    async fn execute_exchange(
        &self,
        ctx: &CommandContext,
        fmt: &dyn OutputFormatter,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<()> {
        let client = ctx.client()?;
        let tokens = client
            .exchange_code_for_tokens(code, verifier)
            .await
            .context("Authorization code exchange failed")?;

        print_tokens(ctx, fmt, "Authorized", &tokens)
    }

    async fn execute_refresh(
        &self,
        ctx: &CommandContext,
        fmt: &dyn OutputFormatter,
        refresh_token: &str,
    ) -> Result<()> {
        let client = ctx.client()?;
        client.set_token_set(TokenSet {
            access_token: None,
            refresh_token: Some(refresh_token.to_string()),
            expires_at: None,
        });
        client.refresh_now().await.context("Token refresh failed")?;

        print_tokens(ctx, fmt, "Tokens refreshed", &client.tokens())
    }
}

fn print_tokens(
    ctx: &CommandContext,
    fmt: &dyn OutputFormatter,
    headline: &str,
    tokens: &TokenSet,
) -> Result<()> {
    if ctx.is_json() {
        let value = serde_json::to_value(tokens).context("Failed to serialize tokens")?;
        fmt.print_json(&value);
        return Ok(());
    }

    fmt.success(headline);
    if let Some(access) = &tokens.access_token {
        fmt.info(&format!("Access token:  {access}"));
    }
    match &tokens.refresh_token {
        Some(refresh) => fmt.info(&format!("Refresh token: {refresh}")),
        None => fmt.info("Refresh token: (none issued)"),
    }
    if let Some(expires_at) = tokens.expires_at {
        fmt.info(&format!("Expires at:    {}", expires_at.to_rfc3339()));
    }
    Ok(())
}
