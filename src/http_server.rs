//! HTTP server implementation using Axum.

use crate::backend::BackendKind;
use crate::launcher::OutputMode;
use crate::state::AppState;
use crate::supervisor::{Report, Supervisor};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

// Request/Response types
#[derive(Deserialize)]
pub struct RunRequest {
    pub backend: BackendKind,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub environment_id: Option<String>,
    pub outcome: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<Report> for RunResponse {
    fn from(report: Report) -> Self {
        Self {
            environment_id: report.environment_id.map(|id| id.to_string()),
            outcome: report.outcome.label().to_string(),
            exit_code: report.outcome.exit_code(),
            stdout: String::from_utf8_lossy(&report.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&report.stderr).into_owned(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

async fn health() -> &'static str {
    "OK"
}

/// The fragment travels as a JSON string, so it must be valid UTF-8; raw
/// byte fragments are only accepted on the CLI path.
async fn run(State(state): State<AppState>, Json(req): Json<RunRequest>) -> Json<RunResponse> {
    info!(backend = ?req.backend, bytes = req.code.len(), "POST /run");
    let report = Supervisor::new(&state.config)
        .run(req.backend, req.code.as_bytes(), OutputMode::Capture)
        .await;
    info!(
        "POST /run - result: outcome={} exit={}",
        report.outcome.label(),
        report.exit_code()
    );
    Json(report.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::EnvironmentId;
    use crate::supervisor::{Outcome, Phase};
    use std::time::Duration;

    fn report(outcome: Outcome) -> Report {
        Report {
            environment_id: Some(EnvironmentId::generate("t_").unwrap()),
            outcome,
            phases: vec![Phase::Launching, Phase::Reported],
            stdout: b"42\n".to_vec(),
            stderr: vec![0xff],
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn response_carries_id_outcome_and_status() {
        let response = RunResponse::from(report(Outcome::Completed(3)));
        assert!(response.environment_id.unwrap().starts_with("t_"));
        assert_eq!(response.outcome, "completed");
        assert_eq!(response.exit_code, 3);
        assert_eq!(response.stdout, "42\n");
        assert_eq!(response.stderr, "\u{fffd}");
    }

    #[test]
    fn timeout_response_uses_fixed_status() {
        let response = RunResponse::from(report(Outcome::TimedOut));
        assert_eq!(response.outcome, "timed_out");
        assert_eq!(response.exit_code, 124);
    }
}
