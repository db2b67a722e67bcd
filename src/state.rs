//! Shared application state for service mode.

use crate::config::SandboxConfig;
use std::sync::Arc;

/// Read-only state handed to every request. Invocations share nothing else.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SandboxConfig>,
}

impl AppState {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}
