//! Execution supervisor: deliver the payload, race the child against the
//! deadline, and on breach kill the client and force-remove the environment.
//!
//! ```text
//! Launching -> Running -> Completed -------------------------> Reported
//!                      \-> TimedOut -> Killing -> Reclaiming -> Reported
//! Launching -----------------------------------------------> Reported   (launch failed)
//! ```

use crate::backend::BackendKind;
use crate::config::{SandboxConfig, TIMEOUT_EXIT_CODE, UNAVAILABLE_EXIT_CODE};
use crate::error::SandboxError;
use crate::launcher::{EnvironmentId, LaunchSpec, OutputMode};
use crate::payload::Payload;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on reaping the killed client and draining its pipes.
const REAP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Launching,
    Running,
    Completed,
    TimedOut,
    Killing,
    Reclaiming,
    Reported,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Launching => "launching",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::TimedOut => "timed_out",
            Phase::Killing => "killing",
            Phase::Reclaiming => "reclaiming",
            Phase::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Exactly one per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(i32),
    TimedOut,
    LaunchFailed(String),
}

impl Outcome {
    /// The caller-visible process status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(code) => *code,
            Outcome::TimedOut => TIMEOUT_EXIT_CODE,
            Outcome::LaunchFailed(_) => UNAVAILABLE_EXIT_CODE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::TimedOut => "timed_out",
            Outcome::LaunchFailed(_) => "launch_failed",
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub environment_id: Option<EnvironmentId>,
    pub outcome: Outcome,
    /// Phases visited, in order, ending with [`Phase::Reported`].
    pub phases: Vec<Phase>,
    /// Captured output; empty unless launched with [`OutputMode::Capture`].
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl Report {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

struct Tracker {
    id: Option<String>,
    phases: Vec<Phase>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            id: None,
            phases: vec![Phase::Launching],
        }
    }

    fn enter(&mut self, phase: Phase) {
        let from = self.phases.last().copied().unwrap_or(Phase::Launching);
        debug!(
            environment_id = self.id.as_deref(),
            %from,
            to = %phase,
            "Phase transition"
        );
        self.phases.push(phase);
    }
}

pub struct Supervisor<'a> {
    config: &'a SandboxConfig,
}

impl<'a> Supervisor<'a> {
    pub fn new(config: &'a SandboxConfig) -> Self {
        Self { config }
    }

    /// Run one fragment in a fresh environment. Never fails: every path
    /// ends in a [`Report`].
    pub async fn run(&self, kind: BackendKind, fragment: &[u8], output: OutputMode) -> Report {
        let started = Instant::now();
        let backend = kind.build(self.config);
        let payload = backend.compose(fragment);
        let mut tracker = Tracker::new();

        let id = match EnvironmentId::generate(&self.config.name_prefix) {
            Ok(id) => id,
            Err(e) => {
                return launch_failed(None, tracker, e, started);
            }
        };
        tracker.id = Some(id.to_string());

        let spec = LaunchSpec {
            runtime: &self.config.runtime,
            id: &id,
            backend: backend.as_ref(),
            output,
        };
        let mut child = match spec.spawn() {
            Ok(child) => child,
            // Nothing was created, so there is no environment to name.
            Err(e) => {
                return launch_failed(None, tracker, e, started);
            }
        };

        let limit = self.config.max_capture_bytes;
        let stdout_task = child.stdout.take().map(|s| tokio::spawn(read_capped(s, limit)));
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(read_capped(s, limit)));
        let stdin = child.stdin.take();

        tracker.enter(Phase::Running);
        let deadline = self.config.deadline();
        let waited =
            tokio::time::timeout(deadline, deliver_and_wait(&mut child, stdin, &payload)).await;

        let outcome = match waited {
            Ok(Ok(status)) => {
                tracker.enter(Phase::Completed);
                let code = status_code(status);
                info!(environment_id = %id, exit_code = code, "Child completed");
                Outcome::Completed(code)
            }
            Ok(Err(e)) => {
                // Lost track of the client after a successful launch. There is
                // no child status to pass through, so this is reported in the
                // launch-failed class (127), but the environment is still
                // reclaimed like a breach and the reason says what happened.
                warn!(environment_id = %id, error = %e, "Waiting on runtime client failed");
                self.force_teardown(&mut tracker, &mut child, &id).await;
                Outcome::LaunchFailed(supervision_lost_reason(&id, &e))
            }
            Err(_) => {
                tracker.enter(Phase::TimedOut);
                warn!(
                    environment_id = %id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Deadline exceeded"
                );
                self.force_teardown(&mut tracker, &mut child, &id).await;
                Outcome::TimedOut
            }
        };

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        tracker.enter(Phase::Reported);
        let elapsed = started.elapsed();
        info!(
            environment_id = %id,
            outcome = outcome.label(),
            exit_code = outcome.exit_code(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Invocation reported"
        );

        Report {
            environment_id: Some(id),
            outcome,
            phases: tracker.phases,
            stdout,
            stderr,
            elapsed,
        }
    }

    /// Kill, then reclaim. Both always run; their errors are discarded.
    async fn force_teardown(&self, tracker: &mut Tracker, child: &mut Child, id: &EnvironmentId) {
        tracker.enter(Phase::Killing);
        terminate(child);

        tracker.enter(Phase::Reclaiming);
        self.reclaim(id).await;

        if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
            debug!(environment_id = %id, "Killed runtime client not reaped in time");
        }
    }

    /// `<runtime> rm -f <id>`, synchronously, output discarded.
    async fn reclaim(&self, id: &EnvironmentId) {
        let result = Command::new(&self.config.runtime)
            .args(["rm", "-f", id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) => debug!(environment_id = %id, ?status, "Forced removal finished"),
            Err(e) => debug!(environment_id = %id, error = %e, "Forced removal failed"),
        }
    }
}

fn launch_failed(
    id: Option<EnvironmentId>,
    mut tracker: Tracker,
    err: SandboxError,
    started: Instant,
) -> Report {
    warn!(error = %err, "Launch failed");
    tracker.enter(Phase::Reported);
    Report {
        environment_id: id,
        outcome: Outcome::LaunchFailed(err.to_string()),
        phases: tracker.phases,
        stdout: Vec::new(),
        stderr: Vec::new(),
        elapsed: started.elapsed(),
    }
}

fn supervision_lost_reason(id: &EnvironmentId, err: &io::Error) -> String {
    format!("supervision lost after launch of {id} (environment reclaimed): {err}")
}

/// Write the payload, close stdin, wait for exit.
async fn deliver_and_wait(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    payload: &Payload,
) -> io::Result<ExitStatus> {
    if let Some(mut stdin) = stdin {
        match stdin.write_all(payload.as_bytes()).await {
            Ok(()) => debug!(bytes = payload.len(), "Payload delivered"),
            // Child exited without reading all of its input.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Child closed stdin early")
            }
            Err(e) => warn!(error = %e, "Payload write failed"),
        }
        drop(stdin);
    }
    child.wait().await
}

fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        debug!("Runtime client already reaped");
        return;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => debug!(pid, "Sent SIGKILL to runtime client"),
        Err(Errno::ESRCH) => debug!(pid, "Runtime client already gone"),
        Err(e) => warn!(pid, error = %e, "SIGKILL failed"),
    }
}

/// Exit code, or `128 + signo` when the client was killed by a signal.
pub fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    let signo = status.signal().unwrap_or(0);
    if let Ok(signal) = Signal::try_from(signo) {
        debug!(%signal, "Runtime client terminated by signal");
    }
    128 + signo
}

/// Read up to `limit` bytes, then drain the rest so the writer never blocks.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = (&mut reader).take(limit as u64).read_to_end(&mut buf).await {
        debug!(error = %e, "Output read failed");
        return buf;
    }
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    buf
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut task) = task else {
        return Vec::new();
    };
    match tokio::time::timeout(REAP_GRACE, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            debug!(error = %e, "Output reader task failed");
            Vec::new()
        }
        Err(_) => {
            task.abort();
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(Outcome::Completed(0).exit_code(), 0);
        assert_eq!(Outcome::Completed(3).exit_code(), 3);
        assert_eq!(Outcome::Completed(127).exit_code(), 127);
        assert_eq!(Outcome::TimedOut.exit_code(), 124);
        assert_eq!(Outcome::LaunchFailed("gone".into()).exit_code(), 127);
    }

    #[test]
    fn exit_status_passes_through() {
        assert_eq!(status_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(status_code(ExitStatus::from_raw(42 << 8)), 42);
        assert_eq!(status_code(ExitStatus::from_raw(125 << 8)), 125);
    }

    #[test]
    fn signal_death_maps_to_shell_convention() {
        assert_eq!(status_code(ExitStatus::from_raw(Signal::SIGKILL as i32)), 137);
    }

    #[test]
    fn supervision_lost_is_distinct_from_missing_runtime() {
        let id = EnvironmentId::generate("t_").unwrap();
        let reason = supervision_lost_reason(&id, &io::Error::other("ECHILD"));
        assert!(reason.starts_with("supervision lost after launch of t_"));
        assert!(reason.contains("environment reclaimed"));
        assert!(!reason.contains("not found on host"));

        let missing = SandboxError::RuntimeUnavailable {
            runtime: "docker".into(),
        };
        assert_ne!(reason, missing.to_string());
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::TimedOut.to_string(), "timed_out");
        assert_eq!(Phase::Reported.to_string(), "reported");
    }

    #[tokio::test]
    async fn capped_read_truncates_and_drains() {
        let data = vec![b'x'; 10_000];
        let out = read_capped(&data[..], 16).await;
        assert_eq!(out, vec![b'x'; 16]);
    }

    #[tokio::test]
    async fn capped_read_under_limit() {
        let out = read_capped(&b"42\n"[..], 1024).await;
        assert_eq!(out, b"42\n");
    }

    #[tokio::test]
    async fn collect_without_task_is_empty() {
        assert!(collect(None).await.is_empty());
    }
}
