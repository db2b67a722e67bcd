//! Error types shared across the launcher, supervisor and configuration layers.

use std::io;
use std::path::PathBuf;

/// Failures that can occur before or while a sandboxed child is running.
///
/// None of these escape the supervisor: it folds every variant into an
/// [`Outcome`](crate::supervisor::Outcome) so callers only ever see an exit status.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The container runtime executable is not installed on the host.
    #[error("container runtime `{runtime}` not found on host")]
    RuntimeUnavailable { runtime: String },

    #[error("failed to spawn container runtime: {0}")]
    Spawn(#[source] io::Error),

    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("os random source unavailable: {0}")]
    Entropy(getrandom::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Classify a spawn failure; a missing executable is its own category.
    pub fn from_spawn(runtime: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            SandboxError::RuntimeUnavailable {
                runtime: runtime.to_string(),
            }
        } else {
            SandboxError::Spawn(err)
        }
    }
}
