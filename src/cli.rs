use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loopcast")]
#[command(author, version, about = "Re-stream a rotating audio playlist over a looping video")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start streaming and serve the control endpoint
    Start {
        /// Host to bind the control endpoint to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to $PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that ffmpeg and yt-dlp are available
    CheckTools,

    /// Validate configuration, stream assets, and playlist
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Resolve one audio reference and print its playable location
    Resolve {
        /// Media reference, e.g. a video page URL
        #[arg(required = true)]
        reference: String,
    },

    /// Display version information
    Version,
}
