use anyhow::{Context, Result};
use clap::Parser;

use lanwatch_core::config::LanwatchConfig;
use lanwatch_daemon::cli::DaemonCli;
use lanwatch_daemon::logging;
use lanwatch_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LanwatchConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .context("invalid configuration after command-line overrides")?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "lanwatch-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.set_config_path(cli.config.clone());
    orchestrator.run().await?;

    tracing::info!("lanwatch-daemon shut down");
    Ok(())
}
