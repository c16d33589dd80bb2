//! vpnsieve - proxy subscription aggregator
//!
//! Fetches public subscription lists, filters and deduplicates them, and
//! republishes the results as plain-text files.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vpnsieve::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Run {
            dry_run,
            output_dir,
        } => vpnsieve::commands::run::run(dry_run, output_dir, &cli.config).await,
        Commands::Inspect { descriptor } => vpnsieve::commands::inspect::run(&descriptor).await,
        Commands::Convert { file } => vpnsieve::commands::convert::run(&file).await,
        Commands::Stats => vpnsieve::commands::stats::run(&cli.config).await,
        Commands::Version => {
            println!("vpnsieve {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
