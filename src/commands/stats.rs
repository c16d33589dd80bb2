//! Stats command implementation.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::fs_abstraction::real_fs;
use crate::stats::display_stats;

/// Run the stats command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    display_stats(real_fs(), &config.state_file)
}
