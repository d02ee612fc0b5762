//! Saiten · exam-practice grading backend
//!
//! - Axum HTTP API driving practice sessions (question → answer → graded result)
//! - LLM grading through an OpenAI-compatible chat completions endpoint
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   API_KEY            : LLM provider key (required)
//!   LLM_BASE_URL       : default Gemini OpenAI-compatible endpoint
//!   LLM_MODEL          : default "gemini-2.5-flash"
//!   LLM_TIMEOUT_SECS   : transport timeout, default 30
//!   PORT               : u16 (default 3000)
//!   SESSION_TTL_SECS   : idle session lifetime, default 3600
//!   MAX_SESSIONS       : live session cap, default 10000
//!   GRADER_CONFIG_PATH : path to TOML config (prompts + optional question bank)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod questions;
mod session;
mod state;
mod protocol;
mod logic;
mod grading;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let settings = Settings::from_env().map_err(|e| {
    error!(target: "saiten_backend", error = %e, "Invalid configuration; refusing to start");
    e
  })?;

  let state = Arc::new(AppState::from_settings(&settings)?);
  let _sweeper = state.spawn_sweeper();
  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "saiten_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "saiten_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "saiten_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "saiten_backend", "Shutdown signal received");
}
