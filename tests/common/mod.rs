//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which owns a fresh [`RunState`] and the
//! [`AppContext`] built on it. The [`with_server`](TestHarness::with_server)
//! constructor starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use loopcast::server::{create_router, AppContext};
use loopcast::startup::StreamConfig;
use loopcast::state::RunState;
use loopcast_av::{AudioResolver, EncodeOutcome, EncodeRunner, PlayableLocation, ResolutionFailure};

/// Test harness wrapping a run flag and the control context around it.
pub struct TestHarness {
    pub run_state: RunState,
    pub ctx: AppContext,
}

impl TestHarness {
    pub fn new() -> Self {
        let run_state = RunState::new();
        let ctx = AppContext::new(run_state.clone());
        Self { run_state, ctx }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Stream configuration pointing at fixed fake paths with no pause.
pub fn stream_config() -> StreamConfig {
    StreamConfig {
        destination: "rtmp://localhost/live/test-key".to_string(),
        video_path: PathBuf::from("/srv/vid.mp4"),
        playlist_path: PathBuf::from("/srv/audio.txt"),
        cycle_pause: Duration::ZERO,
        stop_in_flight: false,
        encode_timeout: None,
        resolve_timeout: None,
    }
}

/// Ordered record of resolve/encode calls shared between fakes and the test.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Resolver that maps every reference to a fake CDN URL.
pub struct EchoResolver {
    pub calls: CallLog,
}

impl AudioResolver for EchoResolver {
    fn resolve(&self, reference: &str) -> Result<PlayableLocation, ResolutionFailure> {
        self.calls.lock().unwrap().push(format!("resolve:{reference}"));
        Ok(PlayableLocation::new(format!("https://cdn.example/{reference}")))
    }
}

/// Encoder that blocks each call until the test releases it.
pub struct GatedRunner {
    pub calls: CallLog,
    pub started: std::sync::mpsc::Sender<String>,
    pub release: Mutex<std::sync::mpsc::Receiver<()>>,
}

impl EncodeRunner for GatedRunner {
    fn run(&self, audio: &PlayableLocation, _video: &Path, _destination: &str) -> EncodeOutcome {
        self.calls.lock().unwrap().push(format!("encode:{audio}"));
        let _ = self.started.send(audio.to_string());
        let _ = self.release.lock().unwrap().recv();
        EncodeOutcome::Success
    }
}

/// Write a config, looping video, and playlist into `dir`.
pub fn write_fixture(dir: &Path, playlist: &str) -> PathBuf {
    write_fixture_with(dir, playlist, "")
}

/// Like [`write_fixture`], with `extra` appended to the config file.
pub fn write_fixture_with(dir: &Path, playlist: &str, extra: &str) -> PathBuf {
    std::fs::write(dir.join("vid.mp4"), b"not really a video").unwrap();
    std::fs::write(dir.join("audio.txt"), playlist).unwrap();

    let config_path = dir.join("loopcast.toml");
    let config = format!(
        r#"
[server]
host = "127.0.0.1"
port = 18000

[stream]
stream_key = "fixture-key"
video_path = "vid.mp4"
playlist_path = "audio.txt"
cycle_pause_ms = 0
{extra}"#
    );
    std::fs::write(&config_path, config).unwrap();
    config_path
}

/// Write an executable shell script standing in for an external tool.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
