//! Industrial - Main Entry Point
//!
//! Time-series classification experiments from the command line.

use clap::Parser;
use industrial_ts::cli::{cmd_features, cmd_fit, cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "industrial_ts=info,industrial=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run(&config)?,
        Commands::Features { data_dir, dataset, generator, output } => {
            cmd_features(&data_dir, &dataset, &generator, &output)?;
        }
        Commands::Info { data_dir, dataset } => cmd_info(&data_dir, &dataset)?,
        Commands::Fit { data_dir, dataset, generator, model, output } => {
            cmd_fit(&data_dir, &dataset, &generator, &model, output.as_deref())?;
        }
    }

    Ok(())
}
