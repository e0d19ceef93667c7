//! Pre-flight checks run before the supervisor starts or the control
//! endpoint binds, and construction of the tool wrappers it drives.
//!
//! Every check is fatal and one-time: if [`prepare`] fails the process logs
//! the error and exits non-zero without serving any control traffic.

use crate::config::{Config, DEFAULT_STREAM_KEY};
use crate::playlist::{self, Playlist};
use crate::state::RunState;
use loopcast_av::{FfmpegRunner, YtDlpResolver, FFMPEG, YT_DLP};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Fatal problems detected before the streaming loop starts.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("missing stream key: set STREAM_KEY or stream.stream_key")]
    MissingStreamKey,

    #[error("looping video not found at {}", .0.display())]
    MissingVideo(PathBuf),

    #[error("playlist file not found at {}", .0.display())]
    MissingPlaylist(PathBuf),

    #[error("failed to read playlist {}: {source}", path.display())]
    UnreadablePlaylist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no audio references found in {}", .0.display())]
    EmptyPlaylist(PathBuf),
}

/// Immutable stream configuration resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Full ingest URL including the stream key.
    pub destination: String,
    pub video_path: PathBuf,
    pub playlist_path: PathBuf,
    pub cycle_pause: Duration,
    pub stop_in_flight: bool,
    pub encode_timeout: Option<Duration>,
    pub resolve_timeout: Option<Duration>,
}

impl StreamConfig {
    /// Derive the stream configuration, resolving relative paths against
    /// `base_dir`. Fails only on an empty stream key.
    pub fn from_config(config: &Config, base_dir: &Path) -> Result<Self, StartupError> {
        let stream = &config.stream;
        let key = stream
            .stream_key
            .as_deref()
            .unwrap_or(DEFAULT_STREAM_KEY)
            .trim();

        if key.is_empty() {
            return Err(StartupError::MissingStreamKey);
        }

        Ok(Self {
            destination: destination_url(&stream.ingest_url, key),
            video_path: base_dir.join(&stream.video_path),
            playlist_path: base_dir.join(&stream.playlist_path),
            cycle_pause: Duration::from_millis(stream.cycle_pause_ms),
            stop_in_flight: stream.stop_in_flight,
            encode_timeout: stream.encode_timeout_secs.map(Duration::from_secs),
            resolve_timeout: stream.resolve_timeout_secs.map(Duration::from_secs),
        })
    }
}

/// Join the ingest prefix and stream key with exactly one slash.
pub fn destination_url(ingest_url: &str, stream_key: &str) -> String {
    format!(
        "{}/{}",
        ingest_url.trim().trim_end_matches('/'),
        stream_key.trim().trim_start_matches('/')
    )
}

/// Run every startup check and return what the supervisor needs.
pub fn prepare(config: &Config, base_dir: &Path) -> Result<(StreamConfig, Playlist), StartupError> {
    let stream = StreamConfig::from_config(config, base_dir)?;
    let playlist = playlist::load(&stream)?;
    Ok((stream, playlist))
}

/// Locate a tool binary. A missing tool is not fatal here: each item fails
/// to launch and is skipped until the tool is installed.
fn tool_program(name: &str, configured: Option<&Path>) -> PathBuf {
    match loopcast_av::get_tool_path(name, configured) {
        Ok(path) => path,
        Err(e) => {
            warn!("{}; items will fail until it is installed", e);
            configured
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(name))
        }
    }
}

/// Build the yt-dlp resolver from `[tools]`.
pub fn build_resolver(config: &Config, timeout: Option<Duration>) -> YtDlpResolver {
    YtDlpResolver::new()
        .with_program(tool_program(YT_DLP, config.tools.yt_dlp.as_deref()))
        .with_cookies_file(config.tools.cookies_file.clone())
        .with_timeout(timeout)
}

/// Build the ffmpeg runner. With `stop_in_flight` the running encode is
/// killed as soon as `run_state` is cleared.
pub fn build_runner(
    config: &Config,
    stream: &StreamConfig,
    run_state: &RunState,
) -> FfmpegRunner {
    let mut runner = FfmpegRunner::new(config.encode.clone())
        .with_program(tool_program(FFMPEG, config.tools.ffmpeg.as_deref()))
        .with_timeout(stream.encode_timeout);
    if stream.stop_in_flight {
        let run_state = run_state.clone();
        runner = runner.abort_when(move || !run_state.is_active());
    }
    runner
}
