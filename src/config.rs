//! Static configuration: runtime executable, images, limits and tool candidates.

use crate::error::{Result, SandboxError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Wall-clock deadline shared by both backends.
pub const DEFAULT_DEADLINE_MS: u64 = 10_000;

/// Status reported when the deadline is exceeded.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Status reported when the container runtime is missing, and used inside
/// the environment when a toolchain binary is missing.
pub const UNAVAILABLE_EXIT_CODE: i32 = 127;

/// Unprivileged numeric identity (nobody:nogroup).
pub const NOBODY_UID: u32 = 65534;
pub const NOBODY_GID: u32 = 65534;

/// Resource ceilings applied to every environment.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub pids: u32,
    pub cpu_secs: u32,
    pub memory_mib: u32,
    pub nofile: u32,
    pub cpus: String,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            pids: 64,
            cpu_secs: 5,
            memory_mib: 256,
            nofile: 256,
            cpus: "1.0".to_string(),
        }
    }
}

/// Writable tmpfs exposed to the compile backend.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Scratch {
    pub path: String,
    pub size_mib: u32,
}

impl Default for Scratch {
    fn default() -> Self {
        Self {
            path: "/tmp".to_string(),
            size_mib: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container runtime client, looked up on the host `PATH`.
    pub runtime: String,
    pub interpreted_image: String,
    pub emulated_image: String,
    pub deadline_ms: u64,
    pub limits: Limits,
    pub uid: u32,
    pub gid: u32,
    pub scratch: Scratch,
    /// Cross-compiler names, tried in order inside the environment.
    pub compilers: Vec<String>,
    /// Emulator names, tried in order inside the environment.
    pub emulators: Vec<String>,
    pub name_prefix: String,
    /// Per-stream capture ceiling for service mode.
    pub max_capture_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            interpreted_image: "python:3.12-slim".to_string(),
            emulated_image: "riscv-sandbox-arch:latest".to_string(),
            deadline_ms: DEFAULT_DEADLINE_MS,
            limits: Limits::default(),
            uid: NOBODY_UID,
            gid: NOBODY_GID,
            scratch: Scratch::default(),
            compilers: vec![
                "riscv64-linux-gnu-gcc".to_string(),
                "riscv64-unknown-linux-gnu-gcc".to_string(),
                "riscv64-linux-musl-gcc".to_string(),
            ],
            emulators: vec![
                "qemu-riscv64-static".to_string(),
                "qemu-riscv64".to_string(),
            ],
            name_prefix: "fragbox_".to_string(),
            max_capture_bytes: 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    /// Load a JSON config file; omitted fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SandboxError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: SandboxConfig =
            serde_json::from_str(&raw).map_err(|e| SandboxError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate().map_err(|message| SandboxError::Config {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.runtime.trim().is_empty() {
            return Err("runtime must not be empty".to_string());
        }
        if self.deadline_ms == 0 {
            return Err("deadline_ms must be positive".to_string());
        }
        if self.compilers.is_empty() {
            return Err("at least one compiler candidate is required".to_string());
        }
        if self.emulators.is_empty() {
            return Err("at least one emulator candidate is required".to_string());
        }
        Ok(())
    }
}
