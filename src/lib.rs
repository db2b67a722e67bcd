//! fragbox - run an untrusted code fragment once, inside a locked-down
//! throwaway container, and report only its exit status.
//!
//! Flow: [`payload`] composes the bytes, [`launcher`] starts the container
//! runtime client with the [`profile`] flags, [`supervisor`] enforces the
//! deadline and reclaims the environment on breach. [`backend`] selects
//! between the interpreted and the compile-and-emulate strategy; the latter
//! resolves its [`toolchain`] inside the container.

#[cfg(not(target_os = "linux"))]
compile_error!("fragbox only works on Linux.");

pub mod backend;
pub mod config;
pub mod error;
pub mod http_server;
pub mod launcher;
pub mod payload;
pub mod profile;
pub mod state;
pub mod supervisor;
pub mod toolchain;

pub use backend::BackendKind;
pub use config::SandboxConfig;
pub use error::{Result, SandboxError};
pub use launcher::OutputMode;
pub use supervisor::{Outcome, Report, Supervisor};
