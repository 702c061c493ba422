use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;

use reelpipe::core::{config, init_logger, log_tools_configuration, metrics, process};
use reelpipe::download::ProgressCallback;
use reelpipe::{Mode, Pipeline, PipelineConfig, SizeTier};

mod cli;

use cli::{Cli, Commands};

/// Operator entry point
///
/// Parses CLI arguments and dispatches to the matching subcommand.
///
/// # Errors
/// Returns an error if logging fails to initialize or the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH, cli.verbose)?;
    metrics::init_metrics();

    let pipeline_config = PipelineConfig::from_env();
    log_tools_configuration(&pipeline_config);

    match cli.command {
        Commands::Download {
            url,
            audio,
            quality,
            bulk,
        } => run_download(pipeline_config, url, audio, quality, bulk).await,
        Commands::Info { url, json } => run_info(pipeline_config, url, json).await,
        Commands::Plan { url, audio, quality } => run_plan(pipeline_config, url, audio, quality),
        Commands::Check => run_check(pipeline_config).await,
    }
}

fn mode_for(audio: bool) -> Mode {
    if audio {
        Mode::Audio
    } else {
        Mode::Video
    }
}

async fn run_download(
    pipeline_config: PipelineConfig,
    url: String,
    audio: bool,
    quality: Option<String>,
    bulk: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(pipeline_config)?;
    let tier = if bulk { SizeTier::Bulk } else { pipeline.default_tier() };

    let progress: ProgressCallback = Arc::new(|percent: &str| eprintln!("⏬ {}", percent));
    let result = pipeline
        .download_with_tier(&url, mode_for(audio), quality.as_deref(), Some(progress), tier)
        .await
        .map_err(|e| anyhow::anyhow!("{} ({})", e, e.kind()))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    log::debug!("Metrics after run:\n{}", metrics::gather_text());
    Ok(())
}

async fn run_info(pipeline_config: PipelineConfig, url: String, json: bool) -> Result<()> {
    let pipeline = Pipeline::new(pipeline_config)?;
    let listing = pipeline
        .list_formats(&url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get info: {}", e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("🎬 Video Information");
    println!("====================");
    println!("URL: {}", url);
    println!("Title: {}", listing.title);
    println!("Channel: {} {}", listing.channel, listing.channel_url);
    if !listing.thumbnail.is_empty() {
        println!("Thumbnail: {}", listing.thumbnail);
    }
    println!();
    println!("{:<12} {:<12} {:<6} {:>10}", "FORMAT", "RESOLUTION", "EXT", "SIZE");
    for entry in &listing.combined {
        let size = entry
            .size_mb
            .map(|mb| format!("{:.1} MB", mb))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:<12} {:<12} {:<6} {:>10}",
            entry.format_id, entry.resolution, entry.ext, size
        );
    }
    if let Some(ref audio) = listing.audio_format_id {
        println!("\nBest audio-only format: {}", audio);
    }
    Ok(())
}

fn run_plan(pipeline_config: PipelineConfig, url: String, audio: bool, quality: Option<String>) -> Result<()> {
    let pipeline = Pipeline::with_registry(pipeline_config, Default::default());
    let plan = pipeline.plan(&url, mode_for(audio), quality.as_deref());

    println!("Normalized URL: {}", plan.url);
    println!("Site: {}", plan.site);
    println!("Strategy: {}", plan.strategy);
    println!("Mode: {}", plan.mode);
    println!("Format: {}", plan.format);
    println!("Force recode: {}", plan.is_sensitive_source);
    println!(
        "Cookies: {}",
        plan.identity
            .cookie_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    for (name, value) in &plan.identity.headers {
        println!("Header: {}: {}", name, value);
    }
    if let Some(ref extractor_args) = plan.identity.extractor_args {
        println!("Extractor args: {}", extractor_args);
    }
    Ok(())
}

async fn run_check(pipeline_config: PipelineConfig) -> Result<()> {
    let tools = [
        (pipeline_config.ytdlp_bin.as_str(), "--version"),
        (pipeline_config.ffmpeg_bin.as_str(), "-version"),
        (pipeline_config.ffprobe_bin.as_str(), "-version"),
    ];

    let mut missing = Vec::new();
    for (bin, flag) in tools {
        if process::tool_available(bin, flag).await {
            println!("✅ {}", bin);
        } else {
            println!("❌ {} (not found or not runnable)", bin);
            missing.push(bin);
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Missing tools: {}", missing.join(", ")))
    }
}
