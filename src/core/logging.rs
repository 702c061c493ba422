//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Cookie and external tool configuration checks logged at startup

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;

use crate::core::config::PipelineConfig;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
/// * `verbose` - Lower the console level to `Debug`
pub fn init_logger(log_file_path: &str, verbose: bool) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    let console_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    CombinedLogger::init(vec![
        TermLogger::new(console_level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto),
        WriteLogger::new(LevelFilter::Debug, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

fn log_cookie_file(label: &str, path: Option<&Path>) {
    match path {
        Some(path) if path.exists() => match path.canonicalize() {
            Ok(abs) => log::info!("✅ {}: {}", label, abs.display()),
            Err(_) => log::warn!("⚠️  {}: {} (exists but cannot canonicalize)", label, path.display()),
        },
        Some(path) => {
            log::warn!("⚠️  {}: {} (FILE NOT FOUND, requests go out without cookies)", label, path.display());
        }
        None => log::info!("{}: not set", label),
    }
}

/// Logs which cookie files the pipeline will attach and which binaries it calls
pub fn log_tools_configuration(config: &PipelineConfig) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🔧 Pipeline configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Download folder: {}", config.download_dir.display());
    log::info!(
        "Tools: yt-dlp={} ffmpeg={} ffprobe={}",
        config.ytdlp_bin,
        config.ffmpeg_bin,
        config.ffprobe_bin
    );
    log::info!(
        "Size ceilings: standard={:.1} MB bulk={:.1} MB (default tier: {})",
        config.standard_ceiling_bytes as f64 / (1024.0 * 1024.0),
        config.bulk_ceiling_bytes as f64 / (1024.0 * 1024.0),
        if config.bulk_by_default { "bulk" } else { "standard" }
    );
    log::info!("Force-recode sites: {:?}", config.force_recode_sites);
    log_cookie_file("YTDL_COOKIES_FILE", config.youtube_cookies.as_deref());
    log_cookie_file("INSTAGRAM_COOKIES_FILE", config.instagram_cookies.as_deref());
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
