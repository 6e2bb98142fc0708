//! Catalog commands - user, playlist, track, search, and favorites
//!
//! Each command builds a session client from `--access-token` /
//! `--refresh-token` (or `TIDAL_ACCESS_TOKEN` / `TIDAL_REFRESH_TOKEN`) and
//! prints the Provider's JSON in `--json` mode or a short summary otherwise.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use tidelink_client::catalog::page_items;
use tracing::info;

use super::{CommandContext, SessionArgs};
use crate::output::OutputFormatter;

/// Prints `resource` as JSON, or as `id` plus scalar attributes.
fn print_resource(ctx: &CommandContext, fmt: &dyn OutputFormatter, resource: &Value) {
    if ctx.is_json() {
        fmt.print_json(resource);
        return;
    }

    let data = resource.get("data").unwrap_or(resource);
    let kind = data.get("type").and_then(Value::as_str).unwrap_or("resource");
    let id = data.get("id").and_then(Value::as_str).unwrap_or("?");
    fmt.success(&format!("{kind} {id}"));

    if let Some(attributes) = data.get("attributes").and_then(Value::as_object) {
        for (key, value) in attributes {
            match value {
                Value::String(s) => fmt.info(&format!("{key}: {s}")),
                Value::Number(_) | Value::Bool(_) => fmt.info(&format!("{key}: {value}")),
                _ => {}
            }
        }
    }
}

/// One line per item, e.g. `1234  tracks  Around the World`.
fn print_listing(fmt: &dyn OutputFormatter, items: &[Value]) {
    for item in items {
        let id = item.get("id").and_then(Value::as_str).unwrap_or("?");
        let kind = item.get("type").and_then(Value::as_str).unwrap_or("");
        let title = item
            .pointer("/attributes/title")
            .or_else(|| item.pointer("/attributes/name"))
            .and_then(Value::as_str)
            .unwrap_or("");
        fmt.info(&format!("{id}  {kind}  {title}"));
    }
}

// ============================================================================
// me
// ============================================================================

#[derive(Debug, Args)]
pub struct MeCommand {
    #[command(flatten)]
    session: SessionArgs,
}

impl MeCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.session_client(&self.session).await?;

        let me = client
            .get_current_user(self.session.country.as_deref())
            .await
            .context("Failed to fetch current user")?;

        print_resource(ctx, &*fmt, &me);
        self.session.report_rotation(&client, &*fmt);
        Ok(())
    }
}

// ============================================================================
// playlist
// ============================================================================

#[derive(Debug, Args)]
pub struct PlaylistCommand {
    /// Playlist UUID
    #[arg(env = "TIDAL_PLAYLIST_ID")]
    id: String,

    /// Fetch every item, following pagination
    #[arg(long)]
    all: bool,

    /// Page size used with --all
    #[arg(long, default_value_t = 50)]
    limit: u32,

    #[command(flatten)]
    session: SessionArgs,
}

impl PlaylistCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.session_client(&self.session).await?;
        let country = self.session.country.as_deref();

        if self.all {
            let items = client
                .get_playlist_items(&self.id, self.limit, 0, country)
                .await
                .with_context(|| format!("Failed to list items of playlist {}", self.id))?;
            info!(playlist_id = %self.id, count = items.len(), "Fetched playlist items");

            if ctx.is_json() {
                fmt.print_json(&json!({ "id": self.id, "items": items }));
            } else {
                fmt.success(&format!("Playlist {} ({} items)", self.id, items.len()));
                print_listing(&*fmt, &items);
            }
        } else {
            let playlist = client
                .get_playlist(&self.id, country, true)
                .await
                .with_context(|| format!("Failed to fetch playlist {}", self.id))?;
            print_resource(ctx, &*fmt, &playlist);
        }

        self.session.report_rotation(&client, &*fmt);
        Ok(())
    }
}

// ============================================================================
// track
// ============================================================================

#[derive(Debug, Args)]
pub struct TrackCommand {
    /// Track id
    id: String,

    #[command(flatten)]
    session: SessionArgs,
}

impl TrackCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.session_client(&self.session).await?;

        let track = client
            .get_track(&self.id, self.session.country.as_deref())
            .await
            .with_context(|| format!("Failed to fetch track {}", self.id))?;

        print_resource(ctx, &*fmt, &track);
        self.session.report_rotation(&client, &*fmt);
        Ok(())
    }
}

// ============================================================================
// search
// ============================================================================

#[derive(Debug, Args)]
pub struct SearchCommand {
    /// Search terms
    query: String,

    /// Maximum number of results
    #[arg(long, default_value_t = 10)]
    limit: u32,

    #[command(flatten)]
    session: SessionArgs,
}

impl SearchCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.session_client(&self.session).await?;

        let results = client
            .search_tracks(&self.query, self.limit, self.session.country.as_deref())
            .await
            .context("Search failed")?;

        if ctx.is_json() {
            fmt.print_json(&results);
        } else {
            let items = page_items(&results);
            fmt.success(&format!("{} results for \"{}\"", items.len(), self.query));
            print_listing(&*fmt, &items);
        }

        self.session.report_rotation(&client, &*fmt);
        Ok(())
    }
}

// ============================================================================
// favorites
// ============================================================================

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    /// Add a track to the user's favorites
    Add {
        track_id: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Remove a track from the user's favorites
    Remove {
        track_id: String,
        #[command(flatten)]
        session: SessionArgs,
    },
}

impl FavoritesCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();

        match self {
            FavoritesCommand::Add { track_id, session } => {
                let client = ctx.session_client(session).await?;
                let body = client
                    .add_track_to_favorites(track_id)
                    .await
                    .with_context(|| format!("Failed to add track {track_id} to favorites"))?;
                if ctx.is_json() {
                    fmt.print_json(&json!({ "added": track_id, "response": body }));
                } else {
                    fmt.success(&format!("Added track {track_id} to favorites"));
                }
                session.report_rotation(&client, &*fmt);
            }
            FavoritesCommand::Remove { track_id, session } => {
                let client = ctx.session_client(session).await?;
                client
                    .remove_track_from_favorites(track_id)
                    .await
                    .with_context(|| format!("Failed to remove track {track_id} from favorites"))?;
                if ctx.is_json() {
                    fmt.print_json(&json!({ "removed": track_id }));
                } else {
                    fmt.success(&format!("Removed track {track_id} from favorites"));
                }
                session.report_rotation(&client, &*fmt);
            }
        }
        Ok(())
    }
}
