//! Ledgerline admin tool entry point.

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use ledgerline_admin::cli::{AdminCommand, Cli};
use ledgerline_admin::runner;
use ledgerline_engine::cancellation::CancellationSource;
use ledgerline_engine::config::EngineConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    config.validate()?;

    let pool = runner::connect(&cli.database_url).await?;

    match cli.command {
        AdminCommand::Migrate => runner::run_migrate(&pool).await?,
        AdminCommand::Replay(args) => {
            let command = args.into_command()?;

            // Ctrl-C stops the replay between batches.
            let source = Arc::new(CancellationSource::new());
            let signal = source.signal();
            let on_interrupt = Arc::clone(&source);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, cancelling replay");
                    on_interrupt.cancel();
                }
            });

            let report = runner::run_replay_pg(pool, &config, &command, &signal).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
