//! The streaming supervisor: the long-running loop that plays the playlist.
//!
//! For each reference, in order, the supervisor resolves a playable audio
//! location and then runs one blocking encode against the looping video.
//! After the last item it pauses briefly and wraps to the head. Per-item
//! failures are logged and skipped; only a cleared [`RunState`] ends the loop,
//! and it is observed before each item, never mid-encode.

use crate::playlist::Playlist;
use crate::startup::StreamConfig;
use crate::state::RunState;
use loopcast_av::{AudioResolver, EncodeOutcome, EncodeRunner, ExitInfo};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest single sleep while pausing between cycles, so a stop request
/// during the pause is noticed quickly.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Cycling through the playlist.
    Running,
    /// The run flag was seen cleared; no new item will start.
    StoppingRequested,
    /// The loop has exited.
    Stopped,
}

/// Outcome of one playlist item. Logged and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistItemResult {
    ResolutionFailed { reference: String, cause: String },
    EncodeFailed { reference: String, cause: ExitInfo },
    Completed { reference: String },
}

impl PlaylistItemResult {
    pub fn reference(&self) -> &str {
        match self {
            Self::ResolutionFailed { reference, .. }
            | Self::EncodeFailed { reference, .. }
            | Self::Completed { reference } => reference,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Counters returned when the supervisor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub attempted: u64,
    pub completed: u64,
    pub resolution_failures: u64,
    pub encode_failures: u64,
    /// Encodes killed mid-item by a stop request.
    pub interrupted: u64,
    /// Full passes over the playlist.
    pub cycles: u64,
}

impl SupervisorReport {
    fn record(&mut self, result: &PlaylistItemResult) {
        self.attempted += 1;
        match result {
            PlaylistItemResult::Completed { .. } => self.completed += 1,
            PlaylistItemResult::ResolutionFailed { .. } => self.resolution_failures += 1,
            PlaylistItemResult::EncodeFailed { cause, .. } if cause.aborted => {
                self.interrupted += 1
            }
            PlaylistItemResult::EncodeFailed { .. } => self.encode_failures += 1,
        }
    }
}

/// Plays a playlist forever, until the run flag is cleared.
pub struct StreamingSupervisor<R, E> {
    playlist: Playlist,
    config: StreamConfig,
    resolver: R,
    runner: E,
    run_state: RunState,
    state: SupervisorState,
    position: usize,
}

impl<R: AudioResolver, E: EncodeRunner> StreamingSupervisor<R, E> {
    pub fn new(
        playlist: Playlist,
        config: StreamConfig,
        resolver: R,
        runner: E,
        run_state: RunState,
    ) -> Self {
        Self {
            playlist,
            config,
            resolver,
            runner,
            run_state,
            state: SupervisorState::Running,
            position: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Index of the next item to play.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Run the loop on the calling thread until stopped.
    ///
    /// Blocks for as long as the stream runs; call it from a dedicated
    /// thread or `spawn_blocking`.
    pub fn run(mut self) -> SupervisorReport {
        info!(
            "Streaming supervisor started: {} items to {}",
            self.playlist.len(),
            redact_destination(&self.config.destination)
        );

        let mut report = SupervisorReport::default();
        while let Some(result) = self.step() {
            report.record(&result);
            if self.position == 0 {
                report.cycles += 1;
                self.pause_between_cycles();
            }
        }

        info!(
            "Streaming supervisor stopped after {} items ({} completed, {} cycles)",
            report.attempted, report.completed, report.cycles
        );
        report
    }

    /// Play the next item, or return `None` once the run flag is cleared.
    ///
    /// Advances the position (wrapping at the end) whatever the outcome.
    pub fn step(&mut self) -> Option<PlaylistItemResult> {
        if self.state == SupervisorState::Stopped {
            return None;
        }

        if !self.run_state.is_active() {
            self.transition(SupervisorState::StoppingRequested);
            self.transition(SupervisorState::Stopped);
            return None;
        }

        let reference = self.playlist.get(self.position)?.to_string();
        let result = self.play(reference);
        self.log_result(&result);

        self.position = (self.position + 1) % self.playlist.len();
        Some(result)
    }

    fn play(&self, reference: String) -> PlaylistItemResult {
        let audio = match self.resolver.resolve(&reference) {
            Ok(audio) => audio,
            Err(failure) => {
                return PlaylistItemResult::ResolutionFailed {
                    reference,
                    cause: failure.cause,
                }
            }
        };

        info!("Streaming from: {}", reference);
        let started = Instant::now();
        let outcome = self
            .runner
            .run(&audio, &self.config.video_path, &self.config.destination);
        debug!("Encode for {} ran {:?}", reference, started.elapsed());

        match outcome {
            EncodeOutcome::Success => PlaylistItemResult::Completed { reference },
            EncodeOutcome::Failure(cause) => PlaylistItemResult::EncodeFailed { reference, cause },
        }
    }

    fn log_result(&self, result: &PlaylistItemResult) {
        match result {
            PlaylistItemResult::Completed { reference } => {
                info!("Finished streaming {}", reference);
            }
            PlaylistItemResult::ResolutionFailed { reference, cause } => {
                warn!("Unable to extract audio from {}: {}", reference, cause);
            }
            PlaylistItemResult::EncodeFailed { reference, cause } if cause.aborted => {
                info!("Stopped streaming {} on request", reference);
            }
            PlaylistItemResult::EncodeFailed { reference, cause } => {
                error!("Error streaming {}: {}", reference, cause);
                for line in &cause.stderr_tail {
                    debug!("  ffmpeg: {}", line);
                }
            }
        }
    }

    fn pause_between_cycles(&self) {
        debug!("Playlist cycle complete, pausing {:?}", self.config.cycle_pause);

        let deadline = Instant::now() + self.config.cycle_pause;
        while self.run_state.is_active() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(PAUSE_SLICE));
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        if self.state != next {
            match next {
                SupervisorState::StoppingRequested => info!("Stopping the stream."),
                SupervisorState::Stopped => debug!("Streaming supervisor stopped"),
                SupervisorState::Running => {}
            }
            self.state = next;
        }
    }
}

/// Hide the stream key (last path segment) when logging the destination.
fn redact_destination(destination: &str) -> String {
    match destination.rsplit_once('/') {
        Some((prefix, key)) if !key.is_empty() => format!("{}/****", prefix),
        _ => destination.to_string(),
    }
}
