use loopcast_av::EncodeProfile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stream key used when neither the config file nor `STREAM_KEY` sets one.
/// Only suitable for local testing against a throwaway ingest.
pub const DEFAULT_STREAM_KEY: &str = "local-test-key";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamSettings,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Fixed output profile handed to the encoder at construction.
    #[serde(default)]
    pub encode: EncodeProfile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamSettings {
    /// Ingest URL prefix; the stream key is appended as the last path segment.
    #[serde(default = "default_ingest_url")]
    pub ingest_url: String,

    /// Stream key (overridden by the `STREAM_KEY` environment variable)
    #[serde(default)]
    pub stream_key: Option<String>,

    /// Video looped behind every track
    #[serde(default = "default_video_path")]
    pub video_path: PathBuf,

    /// Text file with one audio reference per line
    #[serde(default = "default_playlist_path")]
    pub playlist_path: PathBuf,

    /// Pause after each full pass over the playlist, in milliseconds
    #[serde(default = "default_cycle_pause_ms")]
    pub cycle_pause_ms: u64,

    /// Kill the in-flight encoder when a stop is requested instead of
    /// letting the current track finish
    #[serde(default)]
    pub stop_in_flight: bool,

    /// Give up on a single encode after this many seconds
    #[serde(default)]
    pub encode_timeout_secs: Option<u64>,

    /// Give up on a single resolution after this many seconds
    #[serde(default)]
    pub resolve_timeout_secs: Option<u64>,
}

fn default_ingest_url() -> String {
    "rtmp://a.rtmp.youtube.com/live2".to_string()
}
fn default_video_path() -> PathBuf {
    PathBuf::from("vid.mp4")
}
fn default_playlist_path() -> PathBuf {
    PathBuf::from("audio.txt")
}
fn default_cycle_pause_ms() -> u64 {
    1000
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ingest_url: default_ingest_url(),
            stream_key: None,
            video_path: default_video_path(),
            playlist_path: default_playlist_path(),
            cycle_pause_ms: default_cycle_pause_ms(),
            stop_in_flight: false,
            encode_timeout_secs: None,
            resolve_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Explicit ffmpeg binary (falls back to PATH)
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    /// Explicit yt-dlp binary (falls back to PATH)
    #[serde(default)]
    pub yt_dlp: Option<PathBuf>,

    /// Cookies file passed to yt-dlp for references that need a session
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,
}
