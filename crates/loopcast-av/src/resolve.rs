//! Turning opaque media references into directly fetchable audio locations.

use crate::process::{run_captured, WaitLimits};
use crate::tools::YT_DLP;
use crate::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Format selector asking for the best pure-audio variant.
const BEST_AUDIO_FORMAT: &str = "bestaudio/best";

/// A directly fetchable media stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableLocation(String);

impl PlayableLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference that could not be resolved. Never fatal; the cause is for logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unable to resolve {reference}: {cause}")]
pub struct ResolutionFailure {
    pub reference: String,
    pub cause: String,
}

impl ResolutionFailure {
    pub fn new(reference: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            reference: reference.into(),
            cause: cause.to_string(),
        }
    }
}

/// Resolves one opaque reference into a playable audio location.
pub trait AudioResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> std::result::Result<PlayableLocation, ResolutionFailure>;
}

/// [`AudioResolver`] backed by the `yt-dlp` command line tool.
///
/// Runs `yt-dlp --get-url` for the best audio format and takes the first
/// printed URL. No retries are attempted here.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    cookies_file: Option<PathBuf>,
    limits: WaitLimits,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpResolver {
    /// Resolver using `yt-dlp` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(YT_DLP),
            cookies_file: None,
            limits: WaitLimits::default(),
        }
    }

    /// Use a specific yt-dlp executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Pass a Netscape-format cookies file to yt-dlp.
    pub fn with_cookies_file(mut self, cookies_file: Option<PathBuf>) -> Self {
        self.cookies_file = cookies_file;
        self
    }

    /// Give up on a resolution after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Command line arguments for resolving `reference`.
    pub fn args(&self, reference: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--format",
            BEST_AUDIO_FORMAT,
            "--get-url",
            "--no-playlist",
            "--quiet",
            "--no-warnings",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        if let Some(ref cookies) = self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.into());
        }

        // References are opaque and may start with '-'.
        args.push("--".into());
        args.push(reference.into());
        args
    }

    fn locate(&self, reference: &str) -> Result<PlayableLocation> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(reference));

        #[cfg(feature = "tracing")]
        tracing::debug!("Resolving {} with {:?}", reference, self.program);

        let output = run_captured(cmd, YT_DLP, &self.limits)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::tool_failed(
                YT_DLP,
                format!("exit code {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }

        parse_location(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            Error::tool_failed(YT_DLP, "no playable location in resolver output")
        })
    }
}

impl AudioResolver for YtDlpResolver {
    fn resolve(&self, reference: &str) -> std::result::Result<PlayableLocation, ResolutionFailure> {
        self.locate(reference)
            .map_err(|e| ResolutionFailure::new(reference, e))
    }
}

/// Take the first non-blank line of resolver output as the location.
pub fn parse_location(stdout: &str) -> Option<PlayableLocation> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PlayableLocation::new)
}
