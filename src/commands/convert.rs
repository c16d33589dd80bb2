//! Convert command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::converter::convert_str;

/// Run the convert command
pub async fn run(file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let descriptors =
        convert_str(&content).with_context(|| format!("Failed to convert {:?}", file))?;

    info!("{} descriptors from {:?}", descriptors.len(), file);
    for descriptor in descriptors {
        println!("{}", descriptor);
    }
    Ok(())
}
