//! Sandbox launcher: names a fresh environment and starts the runtime client
//! with the payload channel attached.

use crate::backend::Backend;
use crate::error::{Result, SandboxError};
use std::fmt;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

const ID_ENTROPY_BYTES: usize = 16;

/// Name of one ephemeral environment: a prefix plus 128 random bits in hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn generate(prefix: &str) -> Result<Self> {
        let mut token = [0u8; ID_ENTROPY_BYTES];
        getrandom::getrandom(&mut token).map_err(SandboxError::Entropy)?;
        Ok(Self(format!("{prefix}{}", hex::encode(token))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the child's output streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Share the supervisor's stdout/stderr.
    Inherit,
    /// Pipe both streams back to the supervisor.
    Capture,
}

/// Everything needed to start one environment.
pub struct LaunchSpec<'a> {
    pub runtime: &'a str,
    pub id: &'a EnvironmentId,
    pub backend: &'a dyn Backend,
    pub output: OutputMode,
}

impl LaunchSpec<'_> {
    /// Arguments to the runtime client (excluding the client itself).
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            // Self-removing on normal exit.
            "--rm".to_string(),
            "--name".to_string(),
            self.id.to_string(),
            "-i".to_string(),
        ];
        args.extend(self.backend.profile().to_args());
        args.push(self.backend.image().to_string());
        args.extend(self.backend.entry_command());
        args
    }

    /// Full argv, client first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.runtime.to_string()];
        argv.extend(self.args());
        argv
    }

    /// Spawn the runtime client with stdin piped. A missing client binary
    /// yields [`SandboxError::RuntimeUnavailable`].
    pub fn spawn(&self) -> Result<Child> {
        let (stdout, stderr) = match self.output {
            OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
            OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
        };

        debug!(environment_id = %self.id, argv = ?self.argv(), "Launch command");
        let child = Command::new(self.runtime)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::from_spawn(self.runtime, e))?;

        info!(
            environment_id = %self.id,
            backend = self.backend.name(),
            pid = ?child.id(),
            "Environment launched"
        );
        Ok(child)
    }
}
