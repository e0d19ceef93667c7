//! Live encoding of one audio location against a looping video.
//!
//! The encoder is `ffmpeg`, run in real time (`-re`). The video input is
//! looped forever and `-shortest` ends the encode when the audio runs out, so
//! one call lasts as long as the track.

use crate::process::{wait_within, AbortFn, WaitLimits, Waited};
use crate::resolve::PlayableLocation;
use crate::tools::FFMPEG;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Number of encoder stderr lines kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for the stderr reader once a killed encoder is reaped.
const TAIL_GRACE: Duration = Duration::from_secs(2);

/// Target profile for the outgoing stream.
///
/// Defaults are tuned for low-bandwidth, always-on operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub preset: String,
    pub tune: String,
    pub video_bitrate: String,
    pub max_rate: String,
    pub buf_size: String,
    pub frame_rate: u32,
    /// `WIDTHxHEIGHT`
    pub resolution: String,
    pub pixel_format: String,
    /// Keyframe interval in frames.
    pub keyframe_interval: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    /// Output container; `flv` for RTMP ingest.
    pub container: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            tune: "zerolatency".to_string(),
            video_bitrate: "150k".to_string(),
            max_rate: "150k".to_string(),
            buf_size: "300k".to_string(),
            frame_rate: 15,
            resolution: "426x240".to_string(),
            pixel_format: "yuv420p".to_string(),
            keyframe_interval: 30,
            audio_codec: "aac".to_string(),
            audio_bitrate: "96k".to_string(),
            audio_sample_rate: 44_100,
            container: "flv".to_string(),
        }
    }
}

/// Why an encode did not finish cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    /// Process exit code, when the process ran and exited normally.
    pub code: Option<i32>,
    pub message: String,
    /// Last lines the encoder wrote to stderr.
    pub stderr_tail: Vec<String>,
    /// The encoder was killed because a stop was requested.
    pub aborted: bool,
}

impl ExitInfo {
    fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            stderr_tail: Vec::new(),
            aborted: false,
        }
    }

    fn with_tail(mut self, stderr_tail: Vec<String>) -> Self {
        self.stderr_tail = stderr_tail;
        self
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(last) = self.stderr_tail.last() {
            write!(f, " (last output: {})", last)?;
        }
        Ok(())
    }
}

/// Result of one encode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeOutcome {
    Success,
    Failure(ExitInfo),
}

impl EncodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EncodeOutcome::Success)
    }
}

/// Streams one audio location muxed with a looping video to a destination.
///
/// Blocks for the whole playback. Launch failures and abnormal exits are
/// reported as [`EncodeOutcome::Failure`], never as panics or errors.
pub trait EncodeRunner: Send + Sync {
    fn run(&self, audio: &PlayableLocation, video: &Path, destination: &str) -> EncodeOutcome;
}

/// [`EncodeRunner`] backed by the `ffmpeg` command line tool.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: PathBuf,
    profile: EncodeProfile,
    limits: WaitLimits,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new(EncodeProfile::default())
    }
}

impl FfmpegRunner {
    /// Runner using `ffmpeg` from `PATH`.
    pub fn new(profile: EncodeProfile) -> Self {
        Self {
            program: PathBuf::from(FFMPEG),
            profile,
            limits: WaitLimits::default(),
        }
    }

    /// Use a specific ffmpeg executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Kill the encoder once it has run for `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Kill the in-flight encoder as soon as `abort` returns `true`.
    pub fn abort_when(mut self, abort: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        let abort: AbortFn = Arc::new(abort);
        self.limits.abort = Some(abort);
        self
    }

    pub fn profile(&self) -> &EncodeProfile {
        &self.profile
    }

    /// Full ffmpeg argument list for one encode.
    pub fn args(&self, audio: &PlayableLocation, video: &Path, destination: &str) -> Vec<OsString> {
        let p = &self.profile;
        let mut args: Vec<OsString> = Vec::with_capacity(48);
        let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));

        push(&["-hide_banner", "-nostats", "-loglevel", "info", "-re"]);
        push(&["-stream_loop", "-1", "-i"]);
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.as_str().into());

        let frame_rate = p.frame_rate.to_string();
        let keyframes = p.keyframe_interval.to_string();
        let sample_rate = p.audio_sample_rate.to_string();
        let pix_fmt = format!("format={}", p.pixel_format);

        let mut push = |items: &[&str]| args.extend(items.iter().map(OsString::from));
        push(&["-c:v", p.video_codec.as_str(), "-preset", p.preset.as_str()]);
        push(&["-tune", p.tune.as_str()]);
        push(&["-b:v", p.video_bitrate.as_str(), "-maxrate", p.max_rate.as_str()]);
        push(&["-bufsize", p.buf_size.as_str()]);
        push(&["-r", frame_rate.as_str(), "-s", p.resolution.as_str()]);
        push(&["-vf", pix_fmt.as_str(), "-g", keyframes.as_str(), "-shortest"]);
        push(&["-c:a", p.audio_codec.as_str(), "-b:a", p.audio_bitrate.as_str()]);
        push(&["-ar", sample_rate.as_str()]);
        push(&["-map", "0:v", "-map", "1:a"]);
        push(&["-f", p.container.as_str(), destination]);
        args
    }
}

impl EncodeRunner for FfmpegRunner {
    fn run(&self, audio: &PlayableLocation, video: &Path, destination: &str) -> EncodeOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(audio, video, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        #[cfg(feature = "tracing")]
        tracing::debug!("Launching {:?} for {}", self.program, audio);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = Error::from_spawn(FFMPEG, e);
                return EncodeOutcome::Failure(ExitInfo::new(err.to_string()));
            }
        };

        let tail = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || collect_tail(stderr)));

        match wait_within(&mut child, &self.limits) {
            Ok(Waited::Exited(status)) => {
                let stderr_tail = tail.and_then(|h| h.join().ok()).unwrap_or_default();
                if status.success() {
                    EncodeOutcome::Success
                } else {
                    EncodeOutcome::Failure(ExitInfo {
                        code: status.code(),
                        message: format!("{} exited with {}", FFMPEG, status),
                        stderr_tail,
                        aborted: false,
                    })
                }
            }
            Ok(Waited::TimedOut(elapsed)) => {
                let err = Error::timed_out(FFMPEG, elapsed);
                EncodeOutcome::Failure(ExitInfo::new(err.to_string()).with_tail(join_tail(tail)))
            }
            Ok(Waited::Aborted) => {
                let info = ExitInfo {
                    aborted: true,
                    ..ExitInfo::new(format!("{} stopped on request", FFMPEG))
                };
                EncodeOutcome::Failure(info.with_tail(join_tail(tail)))
            }
            Err(e) => EncodeOutcome::Failure(
                ExitInfo::new(Error::Io(e).to_string()).with_tail(join_tail(tail)),
            ),
        }
    }
}

/// Collect the stderr tail of a killed encoder.
///
/// The pipe closes once the child is reaped, unless something it spawned
/// still holds it; give up after [`TAIL_GRACE`] in that case.
fn join_tail(tail: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(handle) = tail else {
        return Vec::new();
    };

    let deadline = Instant::now() + TAIL_GRACE;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Vec::new();
        }
        thread::sleep(Duration::from_millis(20));
    }
    handle.join().unwrap_or_default()
}

/// Forward encoder stderr to the log, keeping the last few lines.
fn collect_tail<R: Read>(stderr: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else { break };

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "loopcast_av::ffmpeg", "{}", line);

        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(runner: &FfmpegRunner) -> Vec<String> {
        runner
            .args(
                &PlayableLocation::new("https://cdn.example/audio.m4a"),
                Path::new("/srv/vid.mp4"),
                "rtmp://a.rtmp.youtube.com/live2/key",
            )
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn test_video_loops_and_audio_is_second_input() {
        let args = args_of(&FfmpegRunner::default());

        let inputs: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(inputs.len(), 2);
        assert_eq!(args[inputs[0] - 1], "-1");
        assert_eq!(args[inputs[0] - 2], "-stream_loop");
        assert_eq!(args[inputs[0] + 1], "/srv/vid.mp4");
        assert_eq!(args[inputs[1] + 1], "https://cdn.example/audio.m4a");
        assert!(args.contains(&"-re".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_default_profile_args() {
        let args = args_of(&FfmpegRunner::default());

        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(value_after(&args, "-b:v"), "150k");
        assert_eq!(value_after(&args, "-maxrate"), "150k");
        assert_eq!(value_after(&args, "-bufsize"), "300k");
        assert_eq!(value_after(&args, "-r"), "15");
        assert_eq!(value_after(&args, "-s"), "426x240");
        assert_eq!(value_after(&args, "-vf"), "format=yuv420p");
        assert_eq!(value_after(&args, "-g"), "30");
        assert_eq!(value_after(&args, "-c:a"), "aac");
        assert_eq!(value_after(&args, "-b:a"), "96k");
        assert_eq!(value_after(&args, "-ar"), "44100");
        assert_eq!(value_after(&args, "-f"), "flv");
        assert_eq!(args.last().unwrap(), "rtmp://a.rtmp.youtube.com/live2/key");
    }

    #[test]
    fn test_custom_profile_args() {
        let profile = EncodeProfile {
            resolution: "640x360".to_string(),
            frame_rate: 24,
            ..Default::default()
        };
        let args = args_of(&FfmpegRunner::new(profile));
        assert_eq!(value_after(&args, "-s"), "640x360");
        assert_eq!(value_after(&args, "-r"), "24");
    }

    #[test]
    fn test_launch_failure_is_failure_outcome() {
        let runner = FfmpegRunner::default().with_program("nonexistent_tool_12345");
        let outcome = runner.run(
            &PlayableLocation::new("https://cdn.example/a.m4a"),
            Path::new("vid.mp4"),
            "rtmp://localhost/live/key",
        );
        match outcome {
            EncodeOutcome::Failure(info) => {
                assert_eq!(info.code, None);
                assert!(info.message.contains("tool not found"));
            }
            EncodeOutcome::Success => panic!("expected failure"),
        }
    }

    #[test]
    fn test_exit_info_display_includes_last_line() {
        let info = ExitInfo {
            code: Some(1),
            message: "ffmpeg exited with exit status: 1".to_string(),
            stderr_tail: vec!["first".to_string(), "Connection refused".to_string()],
            aborted: false,
        };
        assert_eq!(
            info.to_string(),
            "ffmpeg exited with exit status: 1 (last output: Connection refused)"
        );
    }

    #[test]
    fn test_collect_tail_keeps_last_lines() {
        let input: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = collect_tail(input.as_bytes());
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.first().unwrap(), "line 30");
        assert_eq!(tail.last().unwrap(), "line 49");
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::atomic::{AtomicBool, Ordering};

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn run(runner: &FfmpegRunner) -> EncodeOutcome {
            runner.run(
                &PlayableLocation::new("https://cdn.example/a.m4a"),
                Path::new("vid.mp4"),
                "rtmp://localhost/live/key",
            )
        }

        #[test]
        fn test_clean_exit_is_success() {
            let dir = tempfile::tempdir().unwrap();
            let runner = FfmpegRunner::default().with_program(script(dir.path(), "exit 0"));
            assert!(run(&runner).is_success());
        }

        #[test]
        fn test_non_zero_exit_reports_code_and_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(
                dir.path(),
                "echo 'rtmp://localhost/live/key: Connection refused' >&2; exit 3",
            );
            let outcome = run(&FfmpegRunner::default().with_program(program));

            let EncodeOutcome::Failure(info) = outcome else {
                panic!("expected failure");
            };
            assert_eq!(info.code, Some(3));
            assert_eq!(
                info.stderr_tail,
                vec!["rtmp://localhost/live/key: Connection refused".to_string()]
            );
        }

        #[test]
        fn test_abort_kills_running_encoder() {
            let dir = tempfile::tempdir().unwrap();
            let stop = std::sync::Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            let runner = FfmpegRunner::default()
                .with_program(script(dir.path(), "exec sleep 30"))
                .abort_when(move || flag.load(Ordering::SeqCst));

            let handle = std::thread::spawn(move || run(&runner));
            std::thread::sleep(Duration::from_millis(300));
            stop.store(true, Ordering::SeqCst);

            let outcome = handle.join().unwrap();
            let EncodeOutcome::Failure(info) = outcome else {
                panic!("expected failure");
            };
            assert!(info.message.contains("stopped on request"));
            assert!(info.aborted);
        }

        #[test]
        fn test_timeout_is_failure_with_stderr_tail() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(
                dir.path(),
                "echo 'Output #0, flv, to rtmp://localhost/live/key' >&2; exec sleep 30",
            );
            let runner = FfmpegRunner::default()
                .with_program(program)
                .with_timeout(Some(Duration::from_millis(500)));

            let EncodeOutcome::Failure(info) = run(&runner) else {
                panic!("expected failure");
            };
            assert!(info.message.contains("timed out"));
            assert!(!info.aborted);
            assert_eq!(
                info.stderr_tail,
                vec!["Output #0, flv, to rtmp://localhost/live/key".to_string()]
            );
        }
    }
}
