//! Run command implementation.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::allowlist::DestinationFilter;
use crate::config::Config;
use crate::fetcher::HttpFetcher;
use crate::fs_abstraction::real_fs;
use crate::lock::LockGuard;
use crate::logger::{RunLog, GENERAL};
use crate::pipeline::{Pipeline, RunSummary};
use crate::stats::RunState;
use crate::uploader::GitHubUploader;
use crate::utils::{format_bytes, format_count_with_separator, short_error};

/// Run the full pipeline
pub async fn run(dry_run: bool, output_dir: Option<PathBuf>, config_path: &Path) -> Result<()> {
    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }

    let _lock = LockGuard::acquire(&config.output_dir)?;
    let fs = real_fs();
    let log = RunLog::new();

    let sources = config.sources.resolve(fs);
    if sources.total() == 0 {
        warn!("No sources configured. Check your configuration.");
    }
    let filter = DestinationFilter::load(
        fs,
        &config.allowlist.domains_file,
        &config.allowlist.ips_file,
    );

    info!("Fetching {} sources...", sources.total());
    let fetcher = HttpFetcher::new(&config.fetch)?;

    let uploader = if config.upload.enabled && !dry_run {
        let uploader = GitHubUploader::new(&config.upload)?;
        if let Err(e) = uploader.check_rate_limit().await {
            log.warn(GENERAL, format!("Could not check GitHub API quota: {}", short_error(&e)));
        }
        Some(uploader)
    } else {
        if dry_run {
            log.info(GENERAL, "Dry-run: uploads skipped");
        }
        None
    };

    let mut pipeline = Pipeline::new(&config, &fetcher, fs, &log);
    if let Some(ref uploader) = uploader {
        pipeline = pipeline.with_uploader(uploader, &config.upload.remote_prefix);
    }
    let summary = pipeline.run(&sources, &filter).await;

    let state = RunState::from_summary(&summary, Utc::now());
    if let Err(e) = state.save(fs, &config.state_file) {
        log.warn(GENERAL, short_error(&e));
    }

    print!("{}", log.flush());
    print_summary(&summary, &log, fetcher.total_downloaded());
    Ok(())
}

fn print_summary(summary: &RunSummary, log: &RunLog, downloaded: usize) {
    let c = &summary.categories;
    println!();
    println!(
        "[OK] {} sources ({} failed, {} downloaded)",
        summary.sources.len(),
        summary.failed_sources(),
        format_bytes(downloaded as u64)
    );
    println!(
        "     default {}, bypass {}, bypass-unsecure {}, {} protocols",
        format_count_with_separator(c.default.len()),
        format_count_with_separator(c.bypass.len()),
        format_count_with_separator(c.bypass_insecure.len()),
        c.protocols.len()
    );
    println!(
        "     {} files written, {} changed",
        summary.written.len(),
        summary.changed_files().count()
    );
    if let Some(uploads) = summary.uploads {
        println!(
            "     uploads: {} created, {} updated, {} unchanged, {} failed",
            uploads.created, uploads.updated, uploads.unchanged, uploads.failed
        );
    }
    let updated = log.updated_files();
    if !updated.is_empty() {
        println!("     updated remotely:");
        for path in updated {
            println!("       {}", path);
        }
    }
}
