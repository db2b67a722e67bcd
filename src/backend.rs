//! Backend strategies. A backend supplies only what differs between the two
//! execution modes: payload composition, image, entry command and profile
//! deltas. Launching and supervision are shared.

use crate::config::SandboxConfig;
use crate::payload::{self, Payload};
use crate::profile::{IsolationProfile, ScratchMount};
use crate::toolchain::Toolchain;
use serde::{Deserialize, Serialize};

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn compose(&self, fragment: &[u8]) -> Payload;

    fn image(&self) -> &str;

    /// Command run inside the environment; it reads the payload from stdin.
    fn entry_command(&self) -> Vec<String>;

    fn profile(&self) -> IsolationProfile;
}

/// Python source defining `solution`, run by the interpreter from stdin.
#[derive(Debug, Clone)]
pub struct Interpreted {
    image: String,
    profile: IsolationProfile,
}

impl Interpreted {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            image: config.interpreted_image.clone(),
            profile: IsolationProfile::from_config(config).with_env("PYTHONDONTWRITEBYTECODE", "1"),
        }
    }
}

impl Backend for Interpreted {
    fn name(&self) -> &'static str {
        "python"
    }

    fn compose(&self, fragment: &[u8]) -> Payload {
        payload::compose_interpreted(fragment)
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn entry_command(&self) -> Vec<String> {
        // Isolated mode, no bytecode, program on stdin.
        ["python", "-I", "-B", "-"].map(String::from).to_vec()
    }

    fn profile(&self) -> IsolationProfile {
        self.profile.clone()
    }
}

/// RISC-V assembly cross-compiled and run under user-mode emulation.
#[derive(Debug, Clone)]
pub struct Emulated {
    image: String,
    profile: IsolationProfile,
    toolchain: Toolchain,
}

impl Emulated {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            image: config.emulated_image.clone(),
            profile: IsolationProfile::from_config(config)
                .with_scratch(ScratchMount::executable(&config.scratch)),
            toolchain: Toolchain::riscv(config),
        }
    }
}

impl Backend for Emulated {
    fn name(&self) -> &'static str {
        "riscv"
    }

    fn compose(&self, fragment: &[u8]) -> Payload {
        payload::compose_emulated(fragment)
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn entry_command(&self) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), self.toolchain.render()]
    }

    fn profile(&self) -> IsolationProfile {
        self.profile.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Python,
    Riscv,
}

impl BackendKind {
    pub fn build(self, config: &SandboxConfig) -> Box<dyn Backend> {
        match self {
            BackendKind::Python => Box::new(Interpreted::new(config)),
            BackendKind::Riscv => Box::new(Emulated::new(config)),
        }
    }
}
