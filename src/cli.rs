use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reelpipe")]
#[command(author, version, about = "Download and transcode media for chat-bot delivery", long_about = None)]
pub struct Cli {
    /// Log debug output to the console
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a URL and print the result as JSON
    Download {
        /// Media page URL
        url: String,

        /// Extract audio only (mp3)
        #[arg(long)]
        audio: bool,

        /// Maximum video height (e.g. 720 or 720p)
        #[arg(short, long)]
        quality: Option<String>,

        /// Size the output for the bulk transport instead of the default tier
        #[arg(long)]
        bulk: bool,
    },

    /// Show title and available formats without downloading
    Info {
        /// Media page URL
        url: String,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the normalized URL and retrieval plan for a URL
    Plan {
        /// Media page URL
        url: String,

        /// Extract audio only
        #[arg(long)]
        audio: bool,

        /// Maximum video height
        #[arg(short, long)]
        quality: Option<String>,
    },

    /// Check that yt-dlp, ffmpeg and ffprobe can be started
    Check,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
