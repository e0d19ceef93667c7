//! Bounded waiting on external child processes.
//!
//! Both tools run as blocking subprocesses. A [`WaitLimits`] optionally adds a
//! deadline and an abort predicate; when either trips, the child is killed and
//! reaped before returning.

use crate::{Error, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a limited wait polls the child.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Predicate checked while waiting; returning `true` kills the child.
pub type AbortFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Optional limits applied while waiting for a child process.
#[derive(Clone, Default)]
pub struct WaitLimits {
    /// Kill the child once it has run this long.
    pub timeout: Option<Duration>,
    /// Kill the child as soon as this returns `true`.
    pub abort: Option<AbortFn>,
}

impl WaitLimits {
    /// Limits with only a deadline.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            abort: None,
        }
    }

    fn is_unbounded(&self) -> bool {
        self.timeout.is_none() && self.abort.is_none()
    }

    fn should_abort(&self) -> bool {
        self.abort.as_ref().is_some_and(|f| f())
    }
}

impl std::fmt::Debug for WaitLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitLimits")
            .field("timeout", &self.timeout)
            .field("abort", &self.abort.is_some())
            .finish()
    }
}

/// How a limited wait ended.
#[derive(Debug)]
pub enum Waited {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The deadline expired and the child was killed.
    TimedOut(Duration),
    /// The abort predicate fired and the child was killed.
    Aborted,
}

/// The parts of a child process a limited wait drives.
trait Reap {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>>;
    fn wait(&mut self) -> std::io::Result<ExitStatus>;
    fn kill(&mut self) -> std::io::Result<()>;
}

impl Reap for Child {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        Child::wait(self)
    }

    fn kill(&mut self) -> std::io::Result<()> {
        Child::kill(self)
    }
}

/// Wait for `child` to exit, honoring `limits`.
///
/// The child is killed and reaped before returning anything other than
/// [`Waited::Exited`], including polling errors.
pub fn wait_within(child: &mut Child, limits: &WaitLimits) -> std::io::Result<Waited> {
    wait_limited(child, limits)
}

fn wait_limited<C: Reap>(child: &mut C, limits: &WaitLimits) -> std::io::Result<Waited> {
    if limits.is_unbounded() {
        return child.wait().map(Waited::Exited);
    }

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Waited::Exited(status)),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(child);
                return Err(e);
            }
        }

        if let Some(timeout) = limits.timeout {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                kill_and_reap(child);
                return Ok(Waited::TimedOut(elapsed));
            }
        }

        if limits.should_abort() {
            kill_and_reap(child);
            return Ok(Waited::Aborted);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_and_reap<C: Reap>(child: &mut C) {
    // The child may already have exited between polls.
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `cmd` to completion, capturing stdout and stderr.
///
/// Output is drained on helper threads so a chatty child cannot fill its pipe
/// and stall while we poll.
pub fn run_captured(mut cmd: Command, tool: &str, limits: &WaitLimits) -> Result<Output> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::from_spawn(tool, e))?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    // On a kill the drain threads are left to finish once the pipes close;
    // grandchildren may still hold them open.
    match wait_within(&mut child, limits)? {
        Waited::Exited(status) => Ok(Output {
            status,
            stdout: stdout.and_then(|h| h.join().ok()).unwrap_or_default(),
            stderr: stderr.and_then(|h| h.join().ok()).unwrap_or_default(),
        }),
        Waited::TimedOut(elapsed) => Err(Error::timed_out(tool, elapsed)),
        Waited::Aborted => Err(Error::tool_failed(tool, "aborted on request")),
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}
