//! # loopcast-av
//!
//! Wrappers around the external tools loopcast drives.
//!
//! This crate provides:
//! - Resolving opaque media references to playable audio URLs with `yt-dlp`
//! - Encoding one audio URL against a looping video into a live stream with `ffmpeg`
//! - Detecting whether those tools are installed
//!
//! Both operations are blocking and sit behind the [`AudioResolver`] and
//! [`EncodeRunner`] traits so callers can substitute their own.
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use loopcast_av::{AudioResolver, EncodeRunner, FfmpegRunner, YtDlpResolver};
//! use std::path::Path;
//!
//! let resolver = YtDlpResolver::new();
//! let runner = FfmpegRunner::default();
//!
//! if let Ok(audio) = resolver.resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ") {
//!     let outcome = runner.run(&audio, Path::new("vid.mp4"), "rtmp://localhost/live/key");
//!     println!("success: {}", outcome.is_success());
//! }
//! ```

pub mod encode;
mod error;
pub mod process;
pub mod resolve;
pub mod tools;

// Re-exports
pub use encode::{EncodeOutcome, EncodeProfile, EncodeRunner, ExitInfo, FfmpegRunner};
pub use error::{Error, Result};
pub use resolve::{AudioResolver, PlayableLocation, ResolutionFailure, YtDlpResolver};
pub use tools::{
    check_configured_tools, check_tool, check_tool_at, check_tools, get_tool_path, ToolInfo, FFMPEG,
    YT_DLP,
};
