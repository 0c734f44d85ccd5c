use anyhow::{Context, Result};
use clap::Parser;
use syndicate_models::SyndicateConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "syndicate",
    about = "Multi-agent trading daemon - independently-ledgered AI agents under a shared inference budget"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/syndicate.toml")]
    config: String,

    /// Start with trading cycles enabled, overriding the config flag
    #[arg(long)]
    enable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: SyndicateConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    let scheduler = syndicate::build_scheduler(&config).context("Failed to build scheduler")?;
    if cli.enable {
        scheduler.set_enabled(true);
    }

    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    scheduler.run().await;

    Ok(())
}
