//! tidelink CLI - Command-line client for the TIDAL catalog
//!
//! Provides commands for:
//! - Running the OAuth2 authorization-code flow by hand
//! - Reading the current user, playlists, and tracks
//! - Searching the catalog
//! - Managing favorite tracks

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tidelink_client::TidalError;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand,
    catalog::{FavoritesCommand, MeCommand, PlaylistCommand, SearchCommand, TrackCommand},
    completions::CompletionsCommand,
    config::ConfigCommand,
    CommandContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "tidelink", version, about = "Command-line client for the TIDAL catalog")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Load client settings from a YAML file instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authorization-code flow commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Show the signed-in user
    Me(MeCommand),
    /// Show a playlist or list its items
    Playlist(PlaylistCommand),
    /// Show a track
    Track(TrackCommand),
    /// Search the catalog for tracks
    Search(SearchCommand),
    /// Manage favorite tracks
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    /// Inspect the resolved client configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(format, cli.config);

    let result = match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Me(cmd) => cmd.execute(&ctx).await,
        Commands::Playlist(cmd) => cmd.execute(&ctx).await,
        Commands::Track(cmd) => cmd.execute(&ctx).await,
        Commands::Search(cmd) => cmd.execute(&ctx).await,
        Commands::Favorites(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(err) = result {
        report_error(&err, format);
        std::process::exit(1);
    }
    Ok(())
}

/// Short machine-readable code for a failed command
fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<TidalError>() {
        Some(TidalError::NotAuthenticated) => "not_authenticated",
        Some(TidalError::AuthExchange { .. }) => "auth_exchange_failed",
        Some(TidalError::AuthRefresh { .. }) => "auth_refresh_failed",
        Some(TidalError::ApiClient { .. }) => "api_error",
        Some(TidalError::RateLimitExceeded { .. }) => "rate_limited",
        Some(TidalError::TransientExhausted { .. }) => "unavailable",
        Some(TidalError::NonRetriableNetwork { .. }) => "network_error",
        Some(TidalError::InvalidConfig(_)) => "invalid_config",
        Some(TidalError::InvalidResponse(_)) => "invalid_response",
        None => "error",
    }
}

fn report_error(err: &anyhow::Error, format: OutputFormat) {
    let fmt = get_formatter(format == OutputFormat::Json);
    fmt.error(error_code(err), &format!("{err:#}"));

    let needs_login = err
        .downcast_ref::<TidalError>()
        .is_some_and(TidalError::requires_reauthentication);
    if needs_login {
        fmt.hint("Run `tidelink auth url` to sign in again");
    }
}
