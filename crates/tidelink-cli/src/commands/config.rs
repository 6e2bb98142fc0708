//! Config command - inspect the client configuration tidelink will use
//!
//! Provides the `tidelink config` CLI command which:
//! 1. Shows the resolved configuration (YAML or JSON), with the secret masked
//! 2. Validates it and reports every problem found

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration
    Show,
    /// Validate the configuration
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
        }
    }

    fn execute_show(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let mut config = ctx.client_config()?;
        if config.client_secret.is_some() {
            config.client_secret = Some("********".to_string());
        }

        if ctx.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            fmt.print_json(&json);
        } else {
            fmt.success("Client configuration");
            fmt.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                fmt.info(line);
            }
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.client_config()?;
        let errors = config.validate();

        info!(errors = errors.len(), "Validated client configuration");

        if ctx.is_json() {
            let problems: Vec<_> = errors
                .iter()
                .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                .collect();
            fmt.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "errors": problems,
            }));
        } else if errors.is_empty() {
            fmt.success("Configuration is valid");
        } else {
            for error in &errors {
                fmt.warn(&error.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Configuration has {} error(s)", errors.len())
        }
    }
}
