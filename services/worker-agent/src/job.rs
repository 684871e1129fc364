//! Job processes: spawn, track, stop, kill.
//!
//! A [`JobHandle`] wraps one child process launched for a spawn command.
//! The dispatch loop sweeps finished handles opportunistically between
//! commands; the shutdown path escalates from SIGTERM to SIGKILL for jobs
//! that outlive the grace period.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::join_all;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Lifecycle states of a tracked job process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Launched and not yet observed exited.
    Running,
    /// SIGTERM delivered; the process may still be running.
    StopRequested,
    /// SIGKILL delivered after the grace period lapsed.
    Killed,
    /// Exit observed and recorded.
    Exited,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running => "running",
            JobState::StopRequested => "stop_requested",
            JobState::Killed => "killed",
            JobState::Exited => "exited",
        }
    }
}

/// How a job process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Terminating signal, when it was signaled instead.
    pub signal: Option<i32>,
}

impl ExitInfo {
    const UNKNOWN: ExitInfo = ExitInfo {
        code: None,
        signal: None,
    };

    fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// Result of waiting on a job with a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitInfo),
    TimedOut,
}

/// One spawned job process and its control surface.
#[derive(Debug)]
pub struct JobHandle {
    child: Child,
    state: JobState,
    exit_info: Option<ExitInfo>,
    script: String,
}

impl JobHandle {
    /// Launch `script` through the shell, with `args` as the positional
    /// parameters `$1..`.
    ///
    /// The child inherits stdout/stderr so job output lands in the host
    /// journal next to the agent's own logs; stdin is closed. The handle
    /// returns as soon as the process exists, never when it finishes.
    pub fn spawn(script: &str, args: &[String]) -> std::io::Result<Self> {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .arg("worker-job")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        debug!(pid = ?child.id(), script = %script, "job process spawned");

        Ok(Self {
            child,
            state: JobState::Running,
            exit_info: None,
            script: script.to_string(),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_info
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Whether the process is still running. Never blocks.
    pub fn is_running(&mut self) -> bool {
        !self.try_reap()
    }

    /// Record the exit status if the process has finished. Never blocks.
    /// Returns true once the job is `Exited`.
    pub fn try_reap(&mut self) -> bool {
        if self.state == JobState::Exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(ExitInfo::from_status(status));
                true
            }
            Ok(None) => false,
            Err(e) => {
                // The process can no longer be observed; stop tracking it.
                warn!(pid = ?self.child.id(), error = %e, "job wait failed, marking exited");
                self.record_exit(ExitInfo::UNKNOWN);
                true
            }
        }
    }

    /// Ask the process to stop via SIGTERM. Does not wait.
    pub fn request_stop(&mut self) {
        if self.try_reap() {
            return;
        }
        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, script = %self.script, error = %e, "SIGTERM delivery failed");
            } else {
                debug!(pid, script = %self.script, "stop requested");
            }
        }
        self.state = JobState::StopRequested;
    }

    /// Kill the process outright. Best-effort; does not wait for the reap.
    pub fn force_kill(&mut self) {
        if self.try_reap() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!(pid = ?self.child.id(), script = %self.script, error = %e, "SIGKILL delivery failed");
        }
        self.state = JobState::Killed;
    }

    /// Wait for the process to exit, up to `timeout`.
    pub async fn await_exit(&mut self, timeout: Duration) -> WaitOutcome {
        if self.try_reap() {
            return WaitOutcome::Exited(self.exit_info.unwrap_or(ExitInfo::UNKNOWN));
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                let info = ExitInfo::from_status(status);
                self.record_exit(info);
                WaitOutcome::Exited(info)
            }
            Ok(Err(e)) => {
                warn!(pid = ?self.child.id(), error = %e, "job wait failed, marking exited");
                self.record_exit(ExitInfo::UNKNOWN);
                WaitOutcome::Exited(ExitInfo::UNKNOWN)
            }
            Err(_) => WaitOutcome::TimedOut,
        }
    }

    fn record_exit(&mut self, info: ExitInfo) {
        self.state = JobState::Exited;
        self.exit_info = Some(info);
        info!(script = %self.script, exit = %info, "job exited");
    }
}

/// Ordered set of jobs that have been spawned and not yet confirmed exited.
///
/// Only the dispatch loop's task touches it, so there is no locking.
#[derive(Debug, Default)]
pub struct PendingJobSet {
    jobs: Vec<JobHandle>,
}

impl PendingJobSet {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn push(&mut self, job: JobHandle) {
        self.jobs.push(job);
        debug!(pending = self.jobs.len(), "tracking job");
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobHandle> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut JobHandle> {
        self.jobs.iter_mut()
    }

    /// Drop every handle whose process has exited. Never blocks.
    pub fn sweep_exited(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain_mut(|job| !job.try_reap());
        let swept = before - self.jobs.len();
        if swept > 0 {
            debug!(swept, pending = self.jobs.len(), "cleared exited jobs");
        }
        swept
    }
}

/// Graceful-then-forceful teardown of every tracked job.
///
/// Delivers SIGTERM to the whole set, waits for all of it concurrently
/// under one grace period, then SIGKILLs whatever is still alive. Jobs that
/// exit in time leave the set as `Exited`; stragglers stay in it as
/// `Killed` with no re-wait, since the process is about to leave.
pub async fn terminate_all(jobs: &mut PendingJobSet, grace: Duration) {
    if jobs.is_empty() {
        info!("no jobs to stop");
        return;
    }

    info!(
        jobs = jobs.len(),
        grace_secs = grace.as_secs(),
        "stopping tracked jobs"
    );

    for job in jobs.iter_mut() {
        job.request_stop();
    }

    join_all(jobs.iter_mut().map(|job| job.await_exit(grace))).await;
    jobs.sweep_exited();

    if !jobs.is_empty() {
        error!(
            stragglers = jobs.len(),
            "grace period elapsed, force-killing remaining jobs"
        );
        for job in jobs.iter_mut() {
            job.force_kill();
        }
    }

    info!("job teardown finished");
}
