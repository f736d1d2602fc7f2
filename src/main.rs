mod changelog;
mod cherry_pick;
mod cli;
mod command;
mod config;
mod conventional;
mod dispatch;
mod error;
mod events;
mod git;
mod handlers;
mod pipeline;
mod providers;
mod release_tool;
mod releases;
mod remotes;
mod request_log;
mod retry;
mod sync;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level
    let env = env_logger::Env::default().default_filter_or(&config.runner.log_level);
    env_logger::Builder::from_env(env).init();

    info!("Starting relaybot {}", env!("CARGO_PKG_VERSION"));
    cli.execute(config).await?;

    Ok(())
}
