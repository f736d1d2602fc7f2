use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::parse_command;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::events::WebhookEvent;
use crate::handlers::Bot;
use crate::releases::latest_release_branches;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(author, version, about = "CI orchestration bot for GitHub and GitLab", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "RELAYBOT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one webhook delivery and wait for it to finish
    Handle {
        /// Value of the X-GitHub-Event header
        #[arg(short, long)]
        event: String,

        /// File holding the delivery body
        #[arg(short = 'f', long)]
        payload: PathBuf,

        /// Record side effects instead of performing them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Print the release branches cherry-picks are suggested to
    Releases {
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Print the command a comment body parses to
    Parse {
        text: String,

        /// Login of the pull request author
        #[arg(short, long, default_value = "")]
        author: String,
    },
}

impl Cli {
    /// Read the configuration file and apply the environment on top.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_env();
        if let Commands::Handle { dry_run: true, .. } = self.command {
            config.runner.dry_run = true;
        }
        Ok(config)
    }

    fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{}", json_output);
        }
        Ok(())
    }

    async fn execute_handle(&self, config: Config, event_type: &str, payload: &Path) -> Result<()> {
        if !config.runner.dry_run {
            config.validate()?;
        }
        let body = std::fs::read(payload)
            .with_context(|| format!("Failed to read payload: {}", payload.display()))?;
        let Some(event) = WebhookEvent::parse(event_type, &body)
            .with_context(|| format!("Failed to decode {event_type} payload"))?
        else {
            info!("Ignoring {event_type} delivery");
            return Ok(());
        };

        let bot = Arc::new(Bot::from_config(config)?);
        if let Some(task) = Dispatcher::new(Arc::clone(&bot)).dispatch(event).await {
            task.await?;
        }

        if bot.config().runner.dry_run {
            self.emit(&bot.request_log().drain())?;
        }
        Ok(())
    }

    pub async fn execute(&self, config: Config) -> Result<()> {
        match &self.command {
            Commands::Handle { event, payload, .. } => {
                self.execute_handle(config, event, payload).await
            }
            Commands::Releases { url } => {
                let url = url.as_deref().unwrap_or(&config.runner.versions_url);
                let branches = latest_release_branches(url)
                    .await
                    .with_context(|| format!("Failed to get release branches from {url}"))?;
                self.emit(&branches)
            }
            Commands::Parse { text, author } => {
                match parse_command(text, author, &config.registry.dependency_bot) {
                    Ok(Some(command)) => println!("{command:#?}"),
                    Ok(None) => println!("no command"),
                    Err(e) => anyhow::bail!("invalid {} command: {e}", e.kind),
                }
                Ok(())
            }
        }
    }
}
