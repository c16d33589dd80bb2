//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "vpnsieve")]
#[command(author, version, about = "Aggregate, filter and republish proxy subscription lists")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all sources, build every category and write the output files
    Run {
        /// Write files locally but don't upload them
        #[arg(long)]
        dry_run: bool,

        /// Override the configured output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Show how a single descriptor is classified
    Inspect {
        /// Descriptor, e.g. vless://uuid@host:443?security=tls#name
        descriptor: String,
    },

    /// Convert a local Clash-style YAML file into descriptors
    Convert {
        /// YAML file path
        file: PathBuf,
    },

    /// Show statistics of the last run
    Stats,

    /// Show version
    Version,
}
